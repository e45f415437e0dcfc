//! Error types for Synclog

use std::io;
use thiserror::Error;

/// Result type for Synclog operations
pub type Result<T> = std::result::Result<T, SyncLogError>;

/// Errors that can occur in Synclog
#[derive(Debug, Error)]
pub enum SyncLogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Neither the file nor its compressed sibling could be opened
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The source is already open
    #[error("Source already open: {0}")]
    AlreadyOpen(String),

    /// Operation needs an open source
    #[error("Source is not open")]
    NotOpen,

    /// Forward-only source asked to move backward or relative to its end
    #[error("Cannot seek forward-only stream to {requested:?} from position {position}")]
    PipeSeek {
        /// Requested target (`None` when seeking from the end)
        requested: Option<u64>,
        /// Logical position at the time of the request
        position: u64,
    },

    /// The external decompressor could not be started or failed
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Writing is only possible on plain files opened for writing
    #[error("Write not supported: {0}")]
    WriteUnsupported(String),

    /// Record payload does not start with a usable frame number
    #[error("Invalid frame index in payload: {0}")]
    InvalidFrameIndex(String),

    /// Record payload does not carry a subframe count
    #[error("Invalid subframe count in payload: {0}")]
    InvalidSubframeCount(String),

    /// Fewer bytes than requested were available
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes requested
        expected: usize,
        /// Bytes actually read
        actual: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

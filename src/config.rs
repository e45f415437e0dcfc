//! Configuration types for Synclog

use serde::{Deserialize, Serialize};

use crate::reader::FrameMode;
use crate::{Result, SyncLogError};

/// Default line buffer capacity (10 MiB)
pub const DEFAULT_LINE_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Default scratch buffer used to skip forward in a decompressed stream (1 MiB)
pub const DEFAULT_DISCARD_BUFFER_SIZE: usize = 1024 * 1024;

/// Default validity window when searching a timestamp (one frame at ~30 Hz)
pub const DEFAULT_TOLERANCE_MS: u32 = 33;

/// Default age accepted for the last record once the stream is exhausted
pub const DEFAULT_END_OF_STREAM_GRACE_MS: u32 = 100;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// How files are opened
    #[serde(default)]
    pub source: SourceConfig,
    /// Timestamp search settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Raw companion file layout
    #[serde(default)]
    pub frames: FrameConfig,
}

/// Source opening policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Try the compressed sibling before the plain file
    ///
    /// Useful on network-mounted stores where probing a missing file is slow.
    #[serde(default)]
    pub compressed_first: bool,
    /// Extension of the compressed sibling (without the dot)
    #[serde(default = "default_compressed_extension")]
    pub compressed_extension: String,
    /// Decompressor command line; the archive path is appended as last argument
    #[serde(default = "default_decompressor")]
    pub decompressor: Vec<String>,
    /// Scratch buffer size for forward seeks on decompressed streams
    #[serde(default = "default_discard_buffer_size")]
    pub discard_buffer_size: usize,
}

fn default_compressed_extension() -> String {
    "7z".to_string()
}

fn default_decompressor() -> Vec<String> {
    vec!["7z".to_string(), "e".to_string(), "-so".to_string()]
}

fn default_discard_buffer_size() -> usize {
    DEFAULT_DISCARD_BUFFER_SIZE
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            compressed_first: false,
            compressed_extension: default_compressed_extension(),
            decompressor: default_decompressor(),
            discard_buffer_size: DEFAULT_DISCARD_BUFFER_SIZE,
        }
    }
}

/// Timestamp search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum line length kept in memory
    pub line_buffer_size: usize,
    /// Validity window used when the caller gives none
    pub default_tolerance_ms: u32,
    /// How stale the last record may be once the stream is exhausted
    pub end_of_stream_grace_ms: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            line_buffer_size: DEFAULT_LINE_BUFFER_SIZE,
            default_tolerance_ms: DEFAULT_TOLERANCE_MS,
            end_of_stream_grace_ms: DEFAULT_END_OF_STREAM_GRACE_MS,
        }
    }
}

/// Raw companion file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Size of one frame in bytes (0 = not configured)
    #[serde(default)]
    pub frame_size: usize,
    /// Single frame or subframe groups
    #[serde(default)]
    pub mode: FrameMode,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncLogError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SyncLogError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.source.compressed_extension.is_empty() {
            return Err(SyncLogError::ConfigError(
                "compressed_extension cannot be empty".to_string(),
            ));
        }

        if self.source.decompressor.is_empty() {
            return Err(SyncLogError::ConfigError(
                "decompressor command cannot be empty".to_string(),
            ));
        }

        if self.source.discard_buffer_size == 0 {
            return Err(SyncLogError::ConfigError(
                "discard_buffer_size must be > 0".to_string(),
            ));
        }

        // Room for at least a timestamp and a line terminator
        if self.search.line_buffer_size < 16 {
            return Err(SyncLogError::ConfigError(format!(
                "line_buffer_size too small: {}",
                self.search.line_buffer_size
            )));
        }

        Ok(())
    }
}

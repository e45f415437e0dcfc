//! Synclog - replay of timestamp-synchronized sensor logs
//!
//! Reads text logs whose lines start with a `seconds.millis` timestamp,
//! answers "which record is valid at time T" per stream, and loads the
//! matching fixed-size frames from raw companion files. Files may also be
//! stored as `.7z` siblings, decoded on the fly.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod reader;
pub mod source;
pub mod time;

pub use config::Config;
pub use error::{Result, SyncLogError};
pub use reader::{FrameMode, FramedRawReader, TimestampIndexReader, TimestampedRecordReader};
pub use source::{ByteSource, OpenMode};
pub use time::TimeValue;

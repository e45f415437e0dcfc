//! Timestamp-driven readers
//!
//! Layers, from the bottom up:
//! - [`TimestampIndexReader`]: parses `seconds.millis` lines and implements
//!   the synchronized search with one-step rewind
//! - [`TimestampedRecordReader`]: exposes each record's payload and calls a
//!   [`RecordProcessor`] hook
//! - [`FramedRawReader`]: maps records to fixed-size frames of a raw file

mod framed;
mod index;
mod line;
mod record;

pub use framed::{FrameMode, FrameProcessor, FramedRawReader};
pub use index::TimestampIndexReader;
pub use line::{
    parse_leading_integer, parse_timestamp_line, parse_timestamp_prefix, trim_line_end,
    ParsedLine,
};
pub use record::{NoopProcessor, RecordProcessor, TimestampedRecordReader};

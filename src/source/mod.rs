//! Byte sources over plain files and compressed siblings

mod byte_source;
mod decoder;

pub use byte_source::{ByteSource, OpenMode, SourceKind};
pub use decoder::{CommandDecoder, DecodedStream, Decoder};

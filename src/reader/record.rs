//! Timestamped records with payload access and a processing hook

use std::path::Path;

use super::index::TimestampIndexReader;
use crate::config::Config;
use crate::time::TimeValue;
use crate::Result;

/// Per-record processing hook
///
/// Stream consumers implement this to interpret payloads (poses, sensor
/// values, ...). The payload borrow ends when the call returns.
pub trait RecordProcessor {
    /// Handle the record found for `requested`; return `false` on failure
    fn process_element(&mut self, requested: TimeValue, payload: &[u8]) -> bool;
}

impl<F> RecordProcessor for F
where
    F: FnMut(TimeValue, &[u8]) -> bool,
{
    fn process_element(&mut self, requested: TimeValue, payload: &[u8]) -> bool {
        self(requested, payload)
    }
}

/// Processor that accepts every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessor;

impl RecordProcessor for NoopProcessor {
    fn process_element(&mut self, _requested: TimeValue, _payload: &[u8]) -> bool {
        true
    }
}

/// Timestamp reader exposing the text after each timestamp
///
/// Payload slices borrow the reader's line buffer and cannot outlive the
/// next read.
#[derive(Debug)]
pub struct TimestampedRecordReader {
    index: TimestampIndexReader,
}

impl TimestampedRecordReader {
    /// Create a closed reader for `path`
    ///
    /// # Errors
    ///
    /// Returns error if the source configuration is unusable
    pub fn new(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        Ok(Self::from_index(TimestampIndexReader::new(path, config)?))
    }

    /// Wrap an existing index reader
    #[must_use]
    pub fn from_index(index: TimestampIndexReader) -> Self {
        Self { index }
    }

    /// Restart at the beginning of the file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be (re)opened
    pub fn reinit(&mut self) -> Result<()> {
        self.index.reinit()
    }

    /// Read the next record
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn next_timestamp(&mut self) -> Result<bool> {
        self.index.next_timestamp()
    }

    /// Re-read the record before the current one
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot seek back
    pub fn previous_timestamp(&mut self) -> Result<bool> {
        self.index.previous_timestamp()
    }

    /// Step back one record
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot seek back
    pub fn rewind(&mut self) -> Result<bool> {
        self.index.rewind()
    }

    /// Position on the record valid at `target`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or read
    pub fn search(&mut self, target: TimeValue, tolerance_ms: u32) -> Result<bool> {
        self.index.search(target, tolerance_ms)
    }

    /// Payload of the record valid at `target`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or read
    pub fn data_for_timestamp(
        &mut self,
        target: TimeValue,
        tolerance_ms: u32,
    ) -> Result<Option<&[u8]>> {
        if self.index.search(target, tolerance_ms)? {
            Ok(self.index.payload())
        } else {
            Ok(None)
        }
    }

    /// Payload for the current record's own timestamp
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn current_data(&mut self, tolerance_ms: u32) -> Result<Option<&[u8]>> {
        match self.index.current() {
            Some(current) => self.data_for_timestamp(current, tolerance_ms),
            None => Ok(None),
        }
    }

    /// Find the record for `target` and hand it to `processor`
    ///
    /// Uses the default validity window. Returns `false` if no record
    /// matches or the processor reports a failure.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or read
    pub fn process<P>(&mut self, target: TimeValue, processor: &mut P) -> Result<bool>
    where
        P: RecordProcessor + ?Sized,
    {
        let tolerance = self.index.default_tolerance_ms();
        match self.data_for_timestamp(target, tolerance)? {
            Some(payload) => Ok(processor.process_element(target, payload)),
            None => Ok(false),
        }
    }

    /// Hand the current record to `processor`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn process_current<P>(&mut self, processor: &mut P) -> Result<bool>
    where
        P: RecordProcessor + ?Sized,
    {
        match self.index.current() {
            Some(current) => self.process(current, processor),
            None => Ok(false),
        }
    }

    /// Current record timestamp
    #[must_use]
    pub fn current(&self) -> Option<TimeValue> {
        self.index.current()
    }

    /// Payload of the current record
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.index.payload()
    }

    /// Underlying index reader
    #[must_use]
    pub fn index(&self) -> &TimestampIndexReader {
        &self.index
    }

    /// Underlying index reader, mutably
    pub fn index_mut(&mut self) -> &mut TimestampIndexReader {
        &mut self.index
    }
}

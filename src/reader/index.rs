//! Timestamp index reader and synchronized search

use std::io::{BufRead, Read, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::line::{parse_timestamp_line, trim_line_end};
use crate::config::{Config, SearchConfig};
use crate::source::{ByteSource, OpenMode};
use crate::time::TimeValue;
use crate::Result;

/// Sequential reader over a timestamp file
///
/// Lines look like `1433341728.727 <payload>` and must be ordered by
/// timestamp; the order is never checked. The reader keeps the current and
/// previous record plus the start offsets of the last two records, which
/// allows exactly one step of rewind.
///
/// The reader is closed until [`reinit`](Self::reinit) (or any read) opens
/// the file. Reaching the end of the file keeps the last record as current.
#[derive(Debug)]
pub struct TimestampIndexReader {
    path: PathBuf,
    source: ByteSource,
    line: Vec<u8>,
    scratch: Vec<u8>,
    line_capacity: usize,
    payload_offset: usize,
    current: Option<TimeValue>,
    previous: Option<TimeValue>,
    // [older, newer] record start offsets
    history: [Option<u64>; 2],
    exhausted: bool,
    // Last record failed the end-of-stream check; no search can match it
    expired: bool,
    default_tolerance_ms: u32,
    end_of_stream_grace_ms: u32,
}

impl TimestampIndexReader {
    /// Create a closed reader for `path`
    ///
    /// # Errors
    ///
    /// Returns error if the source configuration is unusable
    pub fn new(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let source = ByteSource::new(&config.source)?;
        Ok(Self::with_source(path, source, &config.search))
    }

    /// Create a closed reader using an existing (closed) source
    pub fn with_source(path: impl AsRef<Path>, source: ByteSource, search: &SearchConfig) -> Self {
        let line_capacity = search.line_buffer_size.max(2);

        Self {
            path: path.as_ref().to_path_buf(),
            source,
            line: Vec::new(),
            scratch: Vec::new(),
            line_capacity,
            payload_offset: 0,
            current: None,
            previous: None,
            history: [None, None],
            exhausted: false,
            expired: false,
            default_tolerance_ms: search.default_tolerance_ms,
            end_of_stream_grace_ms: search.end_of_stream_grace_ms,
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.payload_offset = 0;
        self.current = None;
        self.previous = None;
        self.history = [None, None];
        self.exhausted = false;
        self.expired = false;
    }

    /// Restart at the beginning of the file, opening it if needed
    ///
    /// The first line is not read yet.
    ///
    /// # Errors
    ///
    /// Returns error if the file (and its compressed sibling) cannot be
    /// opened, or the source cannot go back to its start
    pub fn reinit(&mut self) -> Result<()> {
        self.reset();

        if self.source.is_open() {
            self.source.rewind_to_start()?;
        } else {
            self.source.open(&self.path, OpenMode::Read)?;
        }

        debug!("Reinitialized timestamp reader on {}", self.path.display());
        Ok(())
    }

    /// Close the file; the next read reopens it from the start
    ///
    /// # Errors
    ///
    /// Returns error if the source fails to close
    pub fn close(&mut self) -> Result<()> {
        self.reset();
        self.source.close()
    }

    /// Read the next record
    ///
    /// Lines that do not start with a timestamp are skipped. Returns `false`
    /// once the end of the file is reached; the last record stays current
    /// and further calls keep returning `false`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or read
    pub fn next_timestamp(&mut self) -> Result<bool> {
        if !self.source.is_open() {
            self.reinit()?;
        }

        if self.exhausted {
            return Ok(false);
        }

        loop {
            let start = self.source.tell().unwrap_or(0);

            self.scratch.clear();
            let read = (&mut self.source)
                .take(self.line_capacity as u64)
                .read_until(b'\n', &mut self.scratch)?;

            if read == 0 {
                self.exhausted = true;
                debug!(
                    "End of {} reached, last record {:?}",
                    self.path.display(),
                    self.current
                );
                return Ok(false);
            }

            let content_len = trim_line_end(&self.scratch).len();
            let Some(parsed) = parse_timestamp_line(&self.scratch[..content_len]) else {
                continue;
            };

            self.history = [self.history[1], Some(start)];
            self.previous = self.current;
            self.current = Some(parsed.timestamp);
            self.payload_offset = parsed.payload_offset;

            self.scratch.truncate(content_len);
            std::mem::swap(&mut self.line, &mut self.scratch);
            return Ok(true);
        }
    }

    /// Step back so that the next read returns the previous record again
    ///
    /// Only one step is possible: returns `false` if fewer than two records
    /// were read since the last reinit or rewind. No record is current until
    /// the next read, and that read leaves `previous` empty.
    ///
    /// # Errors
    ///
    /// Returns error if the source refuses to seek back (e.g. a decoded
    /// stream asked to move backward)
    pub fn rewind(&mut self) -> Result<bool> {
        if !self.source.is_open() {
            return Ok(false);
        }

        let Some(target) = self.history[0] else {
            return Ok(false);
        };

        self.source.seek(SeekFrom::Start(target))?;
        self.history = [None, None];
        self.current = None;
        self.previous = None;
        self.payload_offset = 0;
        self.exhausted = false;
        self.expired = false;

        debug!("Rewound {} to offset {}", self.path.display(), target);
        Ok(true)
    }

    /// Rewind one step and read that record again
    ///
    /// # Errors
    ///
    /// Returns error if rewinding or reading fails
    pub fn previous_timestamp(&mut self) -> Result<bool> {
        Ok(self.rewind()? && self.next_timestamp()?)
    }

    /// Position on the record valid at `target`
    ///
    /// Succeeds on an exact match, or snaps back to the latest record before
    /// `target` when that record is at most `tolerance_ms` older. Once the
    /// file is exhausted the last record is accepted if it is at most the
    /// end-of-stream grace older than `target`. Once that check fails the
    /// last record stays current but no later search matches it.
    ///
    /// A miss (`Ok(false)`) means either that the data for `target` is not
    /// there yet (the first record is later) or that it was skipped (the
    /// nearest earlier record is too old); `current`/`previous` tell which.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, read or rewound
    pub fn search(&mut self, target: TimeValue, tolerance_ms: u32) -> Result<bool> {
        if !self.source.is_open() {
            self.reinit()?;
        }

        if self.exhausted {
            return Ok(self.current.is_some() && !self.expired);
        }

        if self.current.is_none() {
            self.next_timestamp()?;
        }

        while let Some(current) = self.current {
            let distance = TimeValue::compare(&target, &current);

            if distance > 0 {
                // Current record is stale
                if self.exhausted {
                    if distance <= i64::from(self.end_of_stream_grace_ms) {
                        return Ok(true);
                    }
                    debug!(
                        "Last record of {} is {} ms older than {}",
                        self.path.display(),
                        distance,
                        target
                    );
                    self.expired = true;
                    return Ok(false);
                }
                self.next_timestamp()?;
                continue;
            }

            if distance < 0 {
                // Overshot: no later data can match an earlier request
                if self.exhausted {
                    self.expired = true;
                    return Ok(false);
                }

                if let Some(previous) = self.previous {
                    let staleness = TimeValue::compare(&target, &previous);
                    if (0..=i64::from(tolerance_ms)).contains(&staleness) {
                        return self.previous_timestamp();
                    }
                }

                return Ok(false);
            }

            return Ok(true);
        }

        Ok(false)
    }

    /// Current record timestamp
    #[must_use]
    pub fn current(&self) -> Option<TimeValue> {
        self.current
    }

    /// Record read before the current one
    ///
    /// Always earlier than (or equal to) the current record; empty right
    /// after a rewind.
    #[must_use]
    pub fn previous(&self) -> Option<TimeValue> {
        self.previous
    }

    /// Whether the end of the file was reached
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether the underlying file is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Current record line, without its terminator
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Payload of the current record
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.current.map(|_| &self.line[self.payload_offset..])
    }

    /// Index of the payload within [`line`](Self::line)
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Validity window used when none is given
    #[must_use]
    pub fn default_tolerance_ms(&self) -> u32 {
        self.default_tolerance_ms
    }

    /// Age accepted for the last record once the file is exhausted
    #[must_use]
    pub fn end_of_stream_grace_ms(&self) -> u32 {
        self.end_of_stream_grace_ms
    }

    /// Path of the timestamp file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying byte source
    #[must_use]
    pub fn source(&self) -> &ByteSource {
        &self.source
    }
}

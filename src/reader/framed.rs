//! Raw frame extraction driven by a timestamp file
//!
//! Each timestamp line carries the number of a frame in a companion raw
//! file made of fixed-size records:
//!
//! ```text
//! 1432037186.049 1, 20323761405951
//! 1432037186.083 2, 20323761746706
//! 1432037186.115 3, 20323762075887
//! ```
//!
//! In subframe mode the second field is the number of consecutive records
//! stored for that timestamp (bodies, faces, ...), possibly 0.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::line::parse_leading_integer;
use super::record::TimestampedRecordReader;
use crate::config::Config;
use crate::source::{ByteSource, OpenMode};
use crate::time::TimeValue;
use crate::{Result, SyncLogError};

/// How many raw records belong to one timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Exactly one frame per record (color, depth, ...)
    #[default]
    Single,
    /// `<frame>, <count>` records of `count` consecutive frames
    Subframes,
}

/// Hook receiving loaded frames
pub trait FrameProcessor {
    /// Handle the frame bytes loaded for `requested`
    ///
    /// `frame` holds `subframe_count` consecutive records; it is empty when
    /// the record announced no subframes.
    fn process_frame(&mut self, requested: TimeValue, frame: &[u8], subframe_count: usize) -> bool;
}

impl<F> FrameProcessor for F
where
    F: FnMut(TimeValue, &[u8], usize) -> bool,
{
    fn process_frame(&mut self, requested: TimeValue, frame: &[u8], subframe_count: usize) -> bool {
        self(requested, frame, subframe_count)
    }
}

/// Parse the `<frame>, <count>` head of a subframe record
fn parse_subframe_count(payload: &[u8]) -> Option<usize> {
    let (_, end) = parse_leading_integer(payload)?;
    let rest = payload[end..].strip_prefix(b",")?;
    let (count, _) = parse_leading_integer(rest)?;
    usize::try_from(count).ok()
}

/// Reader pairing a timestamp file with its raw frame file
#[derive(Debug)]
pub struct FramedRawReader {
    records: TimestampedRecordReader,
    raw: ByteSource,
    raw_path: PathBuf,
    frame_size: usize,
    mode: FrameMode,
    starting_frame: i64,
    // None after a failed read: position in the raw file is unknown
    next_sequential_index: Option<u64>,
    subframe_count: usize,
    frame_buffer: Vec<u8>,
    loaded_len: usize,
    seek_count: u64,
}

impl FramedRawReader {
    /// Create a closed reader over `timestamps` and `raw`
    ///
    /// # Errors
    ///
    /// Returns error if `frame_size` is 0 or the source configuration is
    /// unusable
    pub fn new(
        timestamps: impl AsRef<Path>,
        raw: impl AsRef<Path>,
        frame_size: usize,
        config: &Config,
    ) -> Result<Self> {
        let records = TimestampedRecordReader::new(timestamps, config)?;
        let source = ByteSource::new(&config.source)?;
        Self::with_sources(records, source, raw, frame_size)
    }

    /// Create a closed reader sized and moded by `config.frames`
    ///
    /// # Errors
    ///
    /// Returns error if no frame size is configured or the source
    /// configuration is unusable
    pub fn from_config(
        timestamps: impl AsRef<Path>,
        raw: impl AsRef<Path>,
        config: &Config,
    ) -> Result<Self> {
        if config.frames.frame_size == 0 {
            return Err(SyncLogError::ConfigError(
                "frames.frame_size is not configured".to_string(),
            ));
        }

        Ok(Self::new(timestamps, raw, config.frames.frame_size, config)?
            .with_mode(config.frames.mode))
    }

    /// Build from an existing record reader and a closed raw source
    ///
    /// # Errors
    ///
    /// Returns error if `frame_size` is 0
    pub fn with_sources(
        records: TimestampedRecordReader,
        raw_source: ByteSource,
        raw: impl AsRef<Path>,
        frame_size: usize,
    ) -> Result<Self> {
        if frame_size == 0 {
            return Err(SyncLogError::ConfigError(
                "frame_size must be > 0".to_string(),
            ));
        }

        Ok(Self {
            records,
            raw: raw_source,
            raw_path: raw.as_ref().to_path_buf(),
            frame_size,
            mode: FrameMode::Single,
            starting_frame: 0,
            next_sequential_index: Some(0),
            subframe_count: 0,
            frame_buffer: vec![0; frame_size],
            loaded_len: 0,
            seek_count: 0,
        })
    }

    /// Switch between single-frame and subframe records
    #[must_use]
    pub fn with_mode(mut self, mode: FrameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restart the timestamp file and learn its first frame number
    ///
    /// Frame numbering does not have to start at 0; the first record's
    /// frame number maps to the first raw record. Without a readable first
    /// frame number numbering starts at 0.
    ///
    /// # Errors
    ///
    /// Returns error if the timestamp file cannot be (re)opened
    pub fn reinit(&mut self) -> Result<()> {
        self.records.reinit()?;
        self.subframe_count = 0;
        self.loaded_len = 0;
        self.starting_frame = 0;

        // The raw source keeps its position, so next_sequential_index
        // stays valid across a reinit
        if self.records.next_timestamp()? {
            if let Some((first, _)) = self.records.payload().and_then(parse_leading_integer) {
                self.starting_frame = first;
            }
        }

        debug!(
            "Frames of {} start at {}",
            self.raw_path.display(),
            self.starting_frame
        );

        self.records.reinit()
    }

    /// Frame number announced by the current record
    #[must_use]
    pub fn frame_number(&self) -> Option<i64> {
        self.records
            .payload()
            .and_then(parse_leading_integer)
            .map(|(number, _)| number)
    }

    /// Load the frame(s) valid at `target`
    ///
    /// Returns `false` when no record is valid at `target`.
    ///
    /// # Errors
    ///
    /// Returns error if the record has no usable frame number or the frame
    /// cannot be read
    pub fn load_frame(&mut self, target: TimeValue) -> Result<bool> {
        let tolerance = self.records.index().default_tolerance_ms();

        let Some(payload) = self.records.data_for_timestamp(target, tolerance)? else {
            return Ok(false);
        };

        let index = parse_leading_integer(payload)
            .map(|(number, _)| number)
            .filter(|number| *number >= 0)
            .ok_or_else(|| {
                SyncLogError::InvalidFrameIndex(String::from_utf8_lossy(payload).into_owned())
            })?;

        self.get_frame(index)?;
        Ok(true)
    }

    /// Load frame number `requested` from the raw file
    ///
    /// Consecutive requests read straight on; any other index seeks first.
    /// On failure the frame buffer content is unspecified.
    ///
    /// # Errors
    ///
    /// Returns error if the raw file cannot be opened, the subframe count is
    /// missing, the index precedes the first frame, or a seek/read fails
    pub fn get_frame(&mut self, requested: i64) -> Result<()> {
        self.subframe_count = 0;
        self.loaded_len = 0;

        let physical = requested
            .checked_sub(self.starting_frame)
            .and_then(|offset| u64::try_from(offset).ok())
            .ok_or_else(|| {
                SyncLogError::InvalidFrameIndex(format!(
                    "frame {requested} is not addressable from first frame {}",
                    self.starting_frame
                ))
            })?;

        if !self.raw.is_open() {
            self.raw.open(&self.raw_path, OpenMode::Read)?;
        }

        let count = match self.mode {
            FrameMode::Single => 1,
            FrameMode::Subframes => {
                let payload = self.records.payload().unwrap_or_default();
                match parse_subframe_count(payload) {
                    Some(count) => count,
                    None => {
                        let payload = String::from_utf8_lossy(payload).into_owned();
                        warn!("Could not retrieve number of subframes from {:?}", payload);
                        return Err(SyncLogError::InvalidSubframeCount(payload));
                    }
                }
            }
        };

        if count == 0 {
            // Timestamp without data
            return Ok(());
        }

        let load = self.frame_size.checked_mul(count).ok_or_else(|| {
            SyncLogError::InvalidSubframeCount(format!("{count} subframes overflow"))
        })?;
        if self.frame_buffer.len() < load {
            self.frame_buffer.resize(load, 0);
        }

        let sequential = self.next_sequential_index == Some(physical);
        self.next_sequential_index = None;

        if !sequential {
            let offset = physical.checked_mul(self.frame_size as u64).ok_or_else(|| {
                SyncLogError::InvalidFrameIndex(format!("frame {requested} is out of range"))
            })?;
            self.raw.seek(SeekFrom::Start(offset))?;
            self.seek_count += 1;
        }

        let read = self.raw.read_full(&mut self.frame_buffer[..load])?;
        if read != load {
            return Err(SyncLogError::ShortRead {
                expected: load,
                actual: read,
            });
        }

        self.loaded_len = load;
        self.subframe_count = count;
        self.next_sequential_index = Some(physical + count as u64);
        Ok(())
    }

    /// Load the frame(s) for `target` and hand them to `processor`
    ///
    /// # Errors
    ///
    /// Returns error if loading fails
    pub fn process<P>(&mut self, target: TimeValue, processor: &mut P) -> Result<bool>
    where
        P: FrameProcessor + ?Sized,
    {
        if !self.load_frame(target)? {
            return Ok(false);
        }
        Ok(processor.process_frame(target, self.frame(), self.subframe_count))
    }

    /// Load and process the frame(s) of the current record
    ///
    /// # Errors
    ///
    /// Returns error if loading fails
    pub fn process_current<P>(&mut self, processor: &mut P) -> Result<bool>
    where
        P: FrameProcessor + ?Sized,
    {
        match self.records.current() {
            Some(current) => self.process(current, processor),
            None => Ok(false),
        }
    }

    /// Bytes loaded by the last successful load
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame_buffer[..self.loaded_len]
    }

    /// Loaded bytes split into individual frames
    pub fn subframes(&self) -> impl Iterator<Item = &[u8]> {
        self.frame().chunks_exact(self.frame_size)
    }

    /// Loaded bytes viewed as `T` values without copying
    ///
    /// Returns `None` when the buffer is not suitably aligned or sized for
    /// `T`; [`frame_to_vec`](Self::frame_to_vec) always works.
    #[must_use]
    pub fn frame_as<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.frame()).ok()
    }

    /// Loaded bytes copied into `T` values (e.g. `u16` depth samples)
    #[must_use]
    pub fn frame_to_vec<T: Pod>(&self) -> Vec<T> {
        let size = std::mem::size_of::<T>();
        if size == 0 {
            return Vec::new();
        }

        let mut values = vec![T::zeroed(); self.loaded_len / size];
        let bytes = values.len() * size;
        bytemuck::cast_slice_mut::<T, u8>(&mut values).copy_from_slice(&self.frame()[..bytes]);
        values
    }

    /// Records loaded by the last successful load
    #[must_use]
    pub fn subframe_count(&self) -> usize {
        self.subframe_count
    }

    /// Frame number of the first record
    #[must_use]
    pub fn starting_frame(&self) -> i64 {
        self.starting_frame
    }

    /// Zero-based raw record expected next, if known
    #[must_use]
    pub fn next_sequential_index(&self) -> Option<u64> {
        self.next_sequential_index
    }

    /// Number of seeks issued on the raw file
    #[must_use]
    pub fn seek_count(&self) -> u64 {
        self.seek_count
    }

    /// Size of one raw record
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Current reading mode
    #[must_use]
    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Allocated frame buffer size (never shrinks)
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.frame_buffer.len()
    }

    /// Underlying record reader
    #[must_use]
    pub fn records(&self) -> &TimestampedRecordReader {
        &self.records
    }

    /// Underlying record reader, mutably
    pub fn records_mut(&mut self) -> &mut TimestampedRecordReader {
        &mut self.records
    }
}

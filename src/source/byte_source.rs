//! Plain-file or decompressed-stream byte source

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::decoder::{CommandDecoder, DecodedStream, Decoder};
use crate::config::SourceConfig;
use crate::{Result, SyncLogError};

/// How a source is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read a plain file, falling back to its compressed sibling
    Read,
    /// Create/truncate a plain file (no compression support)
    Write,
}

/// What currently backs an open source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Regular file, fully seekable
    Plain,
    /// Output of a decoder, forward-only
    Pipe,
}

enum Backend {
    Reader(BufReader<File>),
    Writer(File),
    Pipe {
        stream: BufReader<DecodedStream>,
        archive: PathBuf,
    },
}

/// Byte source reading either a plain file or its decompressed sibling
///
/// Both variants share one read/seek/tell contract. The position is tracked
/// logically: for plain files it always matches the OS offset, for
/// decompressed streams it only grows. Seeking backward on a stream is
/// refused, except back to offset 0 which restarts the decoder. Seeking
/// forward on a stream reads and discards bytes through a scratch buffer
/// owned by the source.
pub struct ByteSource {
    backend: Option<Backend>,
    name: PathBuf,
    position: u64,
    compressed_first: bool,
    compressed_extension: String,
    discard_buffer_size: usize,
    scratch: Vec<u8>,
    decoder: Box<dyn Decoder>,
}

impl ByteSource {
    /// Create a closed source configured by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the configured decompressor command is empty
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let decoder = CommandDecoder::from_config(config)?;
        Ok(Self::with_decoder(config, Box::new(decoder)))
    }

    /// Create a closed source using a specific decoder for compressed siblings
    pub fn with_decoder(config: &SourceConfig, decoder: Box<dyn Decoder>) -> Self {
        Self {
            backend: None,
            name: PathBuf::new(),
            position: 0,
            compressed_first: config.compressed_first,
            compressed_extension: config.compressed_extension.clone(),
            discard_buffer_size: config.discard_buffer_size.max(1),
            scratch: Vec::new(),
            decoder,
        }
    }

    /// Open `name`
    ///
    /// In read mode the plain file is tried first and `name.<ext>` is decoded
    /// if the plain file cannot be opened. With `compressed_first` set the
    /// order is reversed. Write mode only ever creates a plain file.
    ///
    /// # Errors
    ///
    /// Returns error if the source is already open or neither candidate can
    /// be opened; the source stays closed.
    pub fn open(&mut self, name: impl AsRef<Path>, mode: OpenMode) -> Result<()> {
        let name = name.as_ref();

        if self.backend.is_some() {
            return Err(SyncLogError::AlreadyOpen(self.name.display().to_string()));
        }

        self.position = 0;

        if mode == OpenMode::Write {
            let file = File::create(name)?;
            self.backend = Some(Backend::Writer(file));
            self.name = name.to_path_buf();
            debug!("Opened {} for writing", name.display());
            return Ok(());
        }

        let archive = self.compressed_sibling(name);

        if self.compressed_first && archive.is_file() {
            match self.open_pipe(&archive) {
                Ok(()) => {
                    self.name = name.to_path_buf();
                    return Ok(());
                }
                Err(e) => debug!("Compressed sibling {} unusable: {}", archive.display(), e),
            }
        }

        match File::open(name) {
            Ok(file) => {
                self.backend = Some(Backend::Reader(BufReader::new(file)));
                self.name = name.to_path_buf();
                debug!("Opened {}", name.display());
                return Ok(());
            }
            Err(e) => debug!("Plain open of {} failed: {}", name.display(), e),
        }

        if !self.compressed_first && archive.is_file() {
            self.open_pipe(&archive)?;
            self.name = name.to_path_buf();
            return Ok(());
        }

        Err(SyncLogError::FileNotFound(name.display().to_string()))
    }

    fn open_pipe(&mut self, archive: &Path) -> Result<()> {
        let stream = self.decoder.open(archive)?;
        info!("Reading {} through decoder", archive.display());

        self.backend = Some(Backend::Pipe {
            stream: BufReader::new(stream),
            archive: archive.to_path_buf(),
        });
        self.position = 0;
        Ok(())
    }

    /// Path of the compressed sibling of `name`
    #[must_use]
    pub fn compressed_sibling(&self, name: &Path) -> PathBuf {
        let mut sibling = OsString::from(name.as_os_str());
        sibling.push(".");
        sibling.push(&self.compressed_extension);
        PathBuf::from(sibling)
    }

    /// Close the file or terminate the decoder
    ///
    /// Closing a closed source is a no-op. `open` may be called again.
    ///
    /// # Errors
    ///
    /// Returns error if flushing the file or reaping the decoder fails
    pub fn close(&mut self) -> Result<()> {
        let backend = self.backend.take();
        self.position = 0;

        match backend {
            None | Some(Backend::Reader(_)) => Ok(()),
            Some(Backend::Writer(mut file)) => {
                file.flush()?;
                Ok(())
            }
            Some(Backend::Pipe { stream, .. }) => stream.into_inner().close(),
        }
    }

    /// Whether the source is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Backing of the open source
    #[must_use]
    pub fn kind(&self) -> Option<SourceKind> {
        match self.backend {
            None => None,
            Some(Backend::Reader(_) | Backend::Writer(_)) => Some(SourceKind::Plain),
            Some(Backend::Pipe { .. }) => Some(SourceKind::Pipe),
        }
    }

    /// Whether the source is a forward-only decoded stream
    #[must_use]
    pub fn is_pipe(&self) -> bool {
        self.kind() == Some(SourceKind::Pipe)
    }

    /// Logical name the source was opened with
    #[must_use]
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Current logical position, `None` when closed
    #[must_use]
    pub fn tell(&self) -> Option<u64> {
        self.backend.as_ref().map(|_| self.position)
    }

    /// Read until `buf` is full or the end of data is reached
    ///
    /// Returns the number of bytes read; 0 when the source is not open.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match Read::read(&mut *self, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }

    /// Write `data` to a plain file opened in write mode
    ///
    /// Returns the number of bytes written; 0 when the source is not open.
    ///
    /// # Errors
    ///
    /// Returns error if the source was opened for reading or is a decoded
    /// stream, or on I/O failure
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.backend {
            None => Ok(0),
            Some(Backend::Writer(file)) => {
                file.write_all(data)?;
                self.position += data.len() as u64;
                Ok(data.len())
            }
            Some(Backend::Reader(_)) => Err(SyncLogError::WriteUnsupported(format!(
                "{} is open for reading",
                self.name.display()
            ))),
            Some(Backend::Pipe { .. }) => Err(SyncLogError::WriteUnsupported(format!(
                "{} is a compressed stream",
                self.name.display()
            ))),
        }
    }

    /// Move to a new position and return it
    ///
    /// # Errors
    ///
    /// Returns error if the source is closed, on I/O failure, or when a
    /// decoded stream is asked to seek from its end, to move backward
    /// (other than to 0), or to skip past its end
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        let position = self.position;

        match &mut self.backend {
            None => Err(SyncLogError::NotOpen),
            Some(Backend::Reader(reader)) => {
                self.position = reader.seek(from)?;
                Ok(self.position)
            }
            Some(Backend::Writer(file)) => {
                self.position = file.seek(from)?;
                Ok(self.position)
            }
            Some(Backend::Pipe { .. }) => {
                let target = match from {
                    SeekFrom::End(_) => {
                        return Err(SyncLogError::PipeSeek {
                            requested: None,
                            position,
                        })
                    }
                    SeekFrom::Start(target) => Some(target),
                    SeekFrom::Current(delta) => position.checked_add_signed(delta),
                };

                let Some(target) = target else {
                    return Err(SyncLogError::PipeSeek {
                        requested: None,
                        position,
                    });
                };

                if target == 0 {
                    if position != 0 {
                        self.restart_pipe()?;
                    }
                    return Ok(0);
                }

                if target <= position {
                    return Err(SyncLogError::PipeSeek {
                        requested: Some(target),
                        position,
                    });
                }

                self.discard(target - position)?;
                Ok(self.position)
            }
        }
    }

    /// Go back to the first byte
    ///
    /// # Errors
    ///
    /// Returns error if the source is closed or the decoder cannot restart
    pub fn rewind_to_start(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    fn restart_pipe(&mut self) -> Result<()> {
        let Some(Backend::Pipe { stream, archive }) = self.backend.take() else {
            return Err(SyncLogError::NotOpen);
        };

        debug!("Restarting decoder for {}", archive.display());
        stream.into_inner().close()?;
        self.open_pipe(&archive)
    }

    fn discard(&mut self, count: u64) -> Result<()> {
        let Some(Backend::Pipe { stream, .. }) = &mut self.backend else {
            return Err(SyncLogError::NotOpen);
        };

        if self.scratch.len() != self.discard_buffer_size {
            self.scratch.resize(self.discard_buffer_size, 0);
        }

        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(self.scratch.len() as u64) as usize;
            let n = match stream.read(&mut self.scratch[..chunk]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                return Err(SyncLogError::ShortRead {
                    expected: count as usize,
                    actual: (count - remaining) as usize,
                });
            }

            self.position += n as u64;
            remaining -= n as u64;
        }

        Ok(())
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.backend {
            None | Some(Backend::Writer(_)) => 0,
            Some(Backend::Reader(reader)) => reader.read(buf)?,
            Some(Backend::Pipe { stream, .. }) => stream.read(buf)?,
        };
        self.position += n as u64;
        Ok(n)
    }
}

impl BufRead for ByteSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.backend {
            None | Some(Backend::Writer(_)) => Ok(&[]),
            Some(Backend::Reader(reader)) => reader.fill_buf(),
            Some(Backend::Pipe { stream, .. }) => stream.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match &mut self.backend {
            None | Some(Backend::Writer(_)) => return,
            Some(Backend::Reader(reader)) => reader.consume(amt),
            Some(Backend::Pipe { stream, .. }) => stream.consume(amt),
        }
        self.position += amt as u64;
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Drop for ByteSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Streams the sibling's bytes unchanged, forward-only
    struct CopyDecoder;

    impl Decoder for CopyDecoder {
        fn open(&self, archive: &Path) -> Result<DecodedStream> {
            Ok(DecodedStream::new(File::open(archive)?))
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            discard_buffer_size: 7,
            ..SourceConfig::default()
        }
    }

    fn source() -> ByteSource {
        ByteSource::with_decoder(&config(), Box::new(CopyDecoder))
    }

    fn digits() -> Vec<u8> {
        (0..100u8).map(|i| b'0' + i % 10).collect()
    }

    #[test]
    fn test_plain_open_read_seek() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(&path, digits()).unwrap();

        let mut src = source();
        assert_eq!(src.tell(), None);
        src.open(&path, OpenMode::Read).unwrap();
        assert_eq!(src.kind(), Some(SourceKind::Plain));

        let mut buf = [0u8; 5];
        assert_eq!(src.read_full(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"01234");
        assert_eq!(src.tell(), Some(5));

        assert_eq!(src.seek(SeekFrom::Start(2)).unwrap(), 2);
        src.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"23456");

        assert_eq!(src.seek(SeekFrom::End(-3)).unwrap(), 97);
        assert_eq!(src.read_full(&mut buf).unwrap(), 3);
        assert_eq!(src.tell(), Some(100));
    }

    #[test]
    fn test_missing_file_and_sibling() {
        let dir = TempDir::new().unwrap();
        let mut src = source();

        let result = src.open(dir.path().join("absent"), OpenMode::Read);
        assert!(matches!(result, Err(SyncLogError::FileNotFound(_))));
        assert!(!src.is_open());

        let mut buf = [0u8; 4];
        assert_eq!(src.read_full(&mut buf).unwrap(), 0);
        assert_eq!(src.write(b"x").unwrap(), 0);
    }

    #[test]
    fn test_falls_back_to_compressed_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(dir.path().join("data.raw.7z"), digits()).unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();
        assert!(src.is_pipe());
        assert_eq!(src.name(), path.as_path());
    }

    #[test]
    fn test_compressed_first_prefers_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(&path, b"plain").unwrap();
        fs::write(dir.path().join("data.raw.7z"), b"packed").unwrap();

        let config = SourceConfig {
            compressed_first: true,
            ..SourceConfig::default()
        };
        let mut src = ByteSource::with_decoder(&config, Box::new(CopyDecoder));
        src.open(&path, OpenMode::Read).unwrap();
        assert!(src.is_pipe());

        let mut out = String::new();
        src.read_to_string(&mut out).unwrap();
        assert_eq!(out, "packed");

        src.close().unwrap();
        fs::remove_file(dir.path().join("data.raw.7z")).unwrap();
        src.open(&path, OpenMode::Read).unwrap();
        assert_eq!(src.kind(), Some(SourceKind::Plain));
    }

    #[test]
    fn test_pipe_forward_seek_discards_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(dir.path().join("data.raw.7z"), digits()).unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();

        let mut buf = [0u8; 3];
        src.read_full(&mut buf).unwrap();
        assert_eq!(src.tell(), Some(3));

        // Crosses several 7-byte scratch chunks
        assert_eq!(src.seek(SeekFrom::Current(40)).unwrap(), 43);
        assert_eq!(src.tell(), Some(43));
        src.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"345");

        assert_eq!(src.seek(SeekFrom::Start(90)).unwrap(), 90);
        src.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"012");
    }

    #[test]
    fn test_pipe_rejects_backward_and_end_seeks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(dir.path().join("data.raw.7z"), digits()).unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();
        src.seek(SeekFrom::Start(10)).unwrap();

        assert!(matches!(
            src.seek(SeekFrom::Start(5)),
            Err(SyncLogError::PipeSeek { requested: Some(5), position: 10 })
        ));
        assert!(matches!(
            src.seek(SeekFrom::Current(0)),
            Err(SyncLogError::PipeSeek { .. })
        ));
        assert!(matches!(
            src.seek(SeekFrom::End(0)),
            Err(SyncLogError::PipeSeek { requested: None, .. })
        ));
        assert_eq!(src.tell(), Some(10));

        let mut buf = [0u8; 1];
        src.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"0");
    }

    #[test]
    fn test_pipe_rewind_restarts_decoder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(dir.path().join("data.raw.7z"), digits()).unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();
        src.seek(SeekFrom::Start(55)).unwrap();

        src.rewind_to_start().unwrap();
        assert_eq!(src.tell(), Some(0));
        assert!(src.is_pipe());

        let mut buf = [0u8; 4];
        src.read_full(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn test_pipe_seek_past_end_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(dir.path().join("data.raw.7z"), digits()).unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();

        assert!(matches!(
            src.seek(SeekFrom::Start(150)),
            Err(SyncLogError::ShortRead { expected: 150, actual: 100 })
        ));
    }

    #[test]
    fn test_write_mode_plain_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        let mut src = source();
        src.open(&path, OpenMode::Write).unwrap();
        assert_eq!(src.write(b"1.000 0\n").unwrap(), 8);
        assert_eq!(src.tell(), Some(8));
        src.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"1.000 0\n");

        src.open(&path, OpenMode::Read).unwrap();
        assert!(matches!(
            src.write(b"x"),
            Err(SyncLogError::WriteUnsupported(_))
        ));
    }

    #[test]
    fn test_double_open_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.raw");
        fs::write(&path, b"abc").unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();
        assert!(matches!(
            src.open(&path, OpenMode::Read),
            Err(SyncLogError::AlreadyOpen(_))
        ));

        src.close().unwrap();
        assert!(!src.is_open());
        src.open(&path, OpenMode::Read).unwrap();
    }

    #[test]
    fn test_buffered_lines_keep_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lines.txt");
        fs::write(dir.path().join("lines.txt.7z"), b"ab\ncde\n").unwrap();

        let mut src = source();
        src.open(&path, OpenMode::Read).unwrap();

        let mut line = Vec::new();
        src.read_until(b'\n', &mut line).unwrap();
        assert_eq!(line, b"ab\n");
        assert_eq!(src.tell(), Some(3));
    }
}

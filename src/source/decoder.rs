//! Decompression adapters producing forward-only byte streams

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::config::SourceConfig;
use crate::{Result, SyncLogError};

/// Turns a compressed archive into a forward-only byte stream
///
/// Implementations decide how decompression happens (external process,
/// embedded library, ...). The stream is consumed strictly forward; the
/// caller emulates seeking on top of it.
pub trait Decoder {
    /// Start decoding `archive` from its first byte
    ///
    /// # Errors
    ///
    /// Returns error if the decoder cannot be started
    fn open(&self, archive: &Path) -> Result<DecodedStream>;
}

/// Forward-only output of a [`Decoder`]
///
/// Owns the child process when decoding runs out of process; dropping or
/// closing the stream terminates it.
pub struct DecodedStream {
    reader: Box<dyn Read + Send>,
    child: Option<Child>,
}

impl DecodedStream {
    /// Wrap an in-process reader
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
        }
    }

    /// Wrap the stdout of a spawned decompressor
    pub fn from_child(reader: impl Read + Send + 'static, child: Child) -> Self {
        Self {
            reader: Box::new(reader),
            child: Some(child),
        }
    }

    /// Stop decoding and reap the child process, if any
    ///
    /// # Errors
    ///
    /// Returns error if the child cannot be waited on
    pub fn close(&mut self) -> Result<()> {
        self.reader = Box::new(io::empty());

        if let Some(mut child) = self.child.take() {
            // The child may already have exited after writing everything
            if child.try_wait()?.is_none() {
                let _ = child.kill();
            }
            let status = child.wait()?;
            debug!("Decoder process exited: {}", status);
        }

        Ok(())
    }
}

impl Read for DecodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for DecodedStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Decoder running an external single-file extractor
///
/// The archive path is appended to the configured command line and the
/// child's standard output is read as the decoded stream. The default
/// command is `7z e -so <archive>`.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
}

impl CommandDecoder {
    /// Create a decoder from a command line (program followed by arguments)
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SyncLogError::ConfigError("Empty decompressor command".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Decoder configured by a [`SourceConfig`]
    ///
    /// # Errors
    ///
    /// Returns error if the configured command line is empty
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(&config.decompressor)
    }

    /// Program that gets spawned
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
            args: vec!["e".to_string(), "-so".to_string()],
        }
    }
}

impl Decoder for CommandDecoder {
    fn open(&self, archive: &Path) -> Result<DecodedStream> {
        let archive = std::fs::canonicalize(archive)?;

        debug!(
            "Spawning decoder: {} {:?} {}",
            self.program,
            self.args,
            archive.display()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&archive)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SyncLogError::Decoder(format!("Failed to spawn {}: {e}", self.program)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SyncLogError::Decoder(format!("No stdout captured from {}", self.program))
        })?;

        Ok(DecodedStream::from_child(stdout, child))
    }
}

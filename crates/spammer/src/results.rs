//! Append-only result log.
//!
//! One JSON event per line. Each append serialises the event first and then
//! writes the whole line under a lock, so concurrent workers never interleave
//! partial lines and every line parses on its own.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use surge_types::{Event, RunConfig};
use tracing::debug;

/// Errors writing the result log.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Result log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writer for the result log.
pub struct ResultRecorder {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultRecorder {
    /// Create (or truncate) the log and write the `config` line.
    pub fn open(path: impl AsRef<Path>, config: RunConfig) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| RecorderError::Io {
                path: path.clone(),
                source,
            })?;

        let recorder = Self {
            path,
            file: Mutex::new(file),
        };
        recorder.append(&Event::Config {
            config,
            time: SystemTime::now(),
        })?;
        debug!(path = %recorder.path.display(), "Result log opened");
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single line.
    pub fn append(&self, event: &Event) -> Result<(), RecorderError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        self.file
            .lock()
            .write_all(&line)
            .map_err(|source| self.io_error(source))
    }

    /// Append a `started` event.
    pub fn started(&self) -> Result<(), RecorderError> {
        self.append(&Event::Started {
            time: SystemTime::now(),
        })
    }

    /// Append an `ended` event.
    pub fn ended(&self) -> Result<(), RecorderError> {
        self.append(&Event::Ended {
            time: SystemTime::now(),
        })
    }

    /// Flush everything written so far to disk.
    pub fn close(&self) -> Result<(), RecorderError> {
        let file = self.file.lock();
        file.sync_all().map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> RecorderError {
        RecorderError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

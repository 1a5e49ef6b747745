//! Append-only JSON Lines log of probe results.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::models::ProbeResult;
use crate::clock::Clock;

/// Log store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One JSON object per line, in arrival order.
///
/// The file is opened per operation and never rewritten. A single writer
/// process is assumed; there is no cross-process locking.
#[derive(Clone)]
pub struct LogStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl LogStore {
    pub fn new<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `recorded_at` and append the record as one line.
    ///
    /// Returns the record exactly as stored.
    pub fn append(&self, result: &ProbeResult) -> Result<ProbeResult, StoreError> {
        let mut record = result.clone();
        record.recorded_at = Some(self.clock.now_string());

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io_error(e))?;

        Ok(record)
    }

    /// Lazily read every parseable record in stored order.
    ///
    /// A missing file reads as empty. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<impl Iterator<Item = ProbeResult>, StoreError> {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(self.io_error(e)),
        };

        Ok(reader
            .into_iter()
            .flat_map(|r| r.split(b'\n'))
            .enumerate()
            .filter_map(|(idx, line)| {
                let line = match line {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable log line {}: {}", idx + 1, e);
                        return None;
                    }
                };
                let line = match std::str::from_utf8(&line) {
                    Ok(text) => text.trim(),
                    Err(e) => {
                        tracing::debug!("Skipping non UTF-8 log line {}: {}", idx + 1, e);
                        return None;
                    }
                };
                if line.is_empty() {
                    return None;
                }
                match serde_json::from_str::<ProbeResult>(line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::debug!("Skipping malformed log line {}: {}", idx + 1, e);
                        None
                    }
                }
            }))
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

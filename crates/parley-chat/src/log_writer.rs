//! Append-only exchange log.
//!
//! One JSON line per completed exchange. The file is opened lazily on the
//! first append and kept open afterwards. A single `Mutex` covers
//! serialize, write and flush, so concurrent exchanges never interleave
//! bytes within a record.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;

use parley_core::config::ExchangeLogConfig;
use parley_core::types::ExchangeLogRecord;

use crate::error::LogWriteError;

/// Destination for completed exchange records.
pub trait ExchangeSink: Send + Sync {
    /// Persist one record. Returns only once the record is durable.
    fn append(&self, record: &ExchangeLogRecord) -> Result<(), LogWriteError>;
}

/// File-backed exchange log shared by every pipeline in the process.
pub struct ExchangeLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    last: Mutex<Option<ExchangeLogRecord>>,
}

impl ExchangeLog {
    /// Create a log for `path`. Nothing is opened until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
            last: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ExchangeLogConfig) -> Self {
        Self::new(config.path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The most recently persisted record, if any.
    pub fn last_record(&self) -> Option<ExchangeLogRecord> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    fn open(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(path = %path.display(), "Exchange log opened");
        Ok(file)
    }
}

impl ExchangeSink for ExchangeLog {
    fn append(&self, record: &ExchangeLogRecord) -> Result<(), LogWriteError> {
        let mut guard = self.file.lock().map_err(|_| LogWriteError::LockPoisoned)?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes())?;
            file.flush()?;
            file.sync_data()?;
        }

        // Still under the file lock, so `last` follows file order.
        if let Ok(mut last) = self.last.lock() {
            *last = Some(record.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExchangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeLog")
            .field("path", &self.path)
            .finish()
    }
}

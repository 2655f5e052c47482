//! File-backed counter: one JSON document per sequence name.
//!
//! Every increment rewrites the document through a temporary file and a
//! rename, so a crash leaves either the old or the new value on disk.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{DurableCounter, SchedulerError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterRecord {
    value: u64,
}

fn fetch_error(name: &str, err: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::SequenceFetch(format!("counter `{name}`: {err}"))
}

/// Counter persisted under a directory as `<name>.json`.
#[derive(Debug)]
pub struct FileCounter {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCounter {
    /// Open (and create if needed) the counter directory.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` when the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn read(&self, name: &str) -> Result<CounterRecord, SchedulerError> {
        match File::open(self.file_path(name)) {
            Ok(file) => serde_json::from_reader(file).map_err(|e| fetch_error(name, e)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(CounterRecord::default()),
            Err(err) => Err(fetch_error(name, err)),
        }
    }

    fn write(&self, name: &str, record: &CounterRecord) -> Result<(), SchedulerError> {
        let target = self.file_path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        let line = serde_json::to_string(record).map_err(|e| fetch_error(name, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| fetch_error(name, e))?;
        writeln!(file, "{line}").map_err(|e| fetch_error(name, e))?;
        file.sync_all().map_err(|e| fetch_error(name, e))?;
        std::fs::rename(&tmp, &target).map_err(|e| fetch_error(name, e))
    }

    /// Current value of `name` as stored on disk.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SequenceFetch` when the file is unreadable.
    pub fn current(&self, name: &str) -> Result<u64, SchedulerError> {
        let _guard = self.lock.lock();
        Ok(self.read(name)?.value)
    }
}

impl DurableCounter for FileCounter {
    fn increment(&self, name: &str) -> Result<u64, SchedulerError> {
        let _guard = self.lock.lock();
        let mut record = self.read(name)?;
        let previous = record.value;
        record.value = previous
            .checked_add(1)
            .ok_or_else(|| fetch_error(name, "overflowed"))?;
        self.write(name, &record)?;
        tracing::debug!(counter = %name, value = record.value, "counter advanced");
        Ok(previous)
    }
}

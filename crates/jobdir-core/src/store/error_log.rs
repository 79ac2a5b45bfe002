//! Error log sidecar: `logs/{job_id}.log`.
//!
//! 最初の失敗で作られ、追記され、rerun と delete で消える。

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use super::FileJobStore;
use crate::domain::{JobId, StoreError};

impl FileJobStore {
    /// Append `text` to the job's error log, creating it if needed.
    pub fn append_error(&self, id: &JobId, text: &str) -> Result<(), StoreError> {
        let path = self.layout.log_path(id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io_at(&path))?;
        file.write_all(text.as_bytes())
            .map_err(StoreError::io_at(&path))?;
        Ok(())
    }

    /// The job's error log; empty when the job never failed.
    pub fn read_error(&self, id: &JobId) -> Result<String, StoreError> {
        let path = self.layout.log_path(id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(StoreError::io_at(&path)(err)),
        }
    }

    pub(super) fn remove_log(&self, id: &JobId) -> Result<(), StoreError> {
        let path = self.layout.log_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io_at(&path)(err)),
        }
    }
}

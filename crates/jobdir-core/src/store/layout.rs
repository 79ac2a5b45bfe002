//! Directory layout of a store root.
//!
//! ```text
//! {root}/
//!   jobs/{record name}      job record, content = JSON payload
//!   logs/{job_id}.log       error log sidecar
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::{JobId, JobRecord, StoreError};

const JOBS_DIR: &str = "jobs";
const LOGS_DIR: &str = "logs";
const LOG_EXTENSION: &str = "log";

#[derive(Debug, Clone)]
pub(crate) struct StoreLayout {
    root: PathBuf,
    jobs: PathBuf,
    logs: PathBuf,
}

impl StoreLayout {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            jobs: root.join(JOBS_DIR),
            logs: root.join(LOGS_DIR),
            root,
        }
    }

    /// Create `jobs/` and `logs/` when missing.
    pub(crate) fn ensure(&self) -> Result<(), StoreError> {
        for dir in [&self.jobs, &self.logs] {
            fs::create_dir_all(dir).map_err(StoreError::io_at(dir))?;
        }
        Ok(())
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn record_path(&self, record: &JobRecord) -> PathBuf {
        self.jobs.join(record.file_name())
    }

    pub(crate) fn log_path(&self, id: &JobId) -> PathBuf {
        self.logs.join(format!("{id}.{LOG_EXTENSION}"))
    }

    /// Every well-formed record in `jobs/`, sorted by job id.
    ///
    /// Names that do not follow the record grammar are skipped with a warning.
    pub(crate) fn scan(&self) -> Result<Vec<JobRecord>, StoreError> {
        self.scan_matching(|_| true)
    }

    /// Records whose name starts with `{id}.`; normally zero or one.
    pub(crate) fn scan_id(&self, id: &JobId) -> Result<Vec<JobRecord>, StoreError> {
        let prefix = format!("{id}.");
        self.scan_matching(|name| name.starts_with(&prefix))
    }

    fn scan_matching(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<JobRecord>, StoreError> {
        let entries = fs::read_dir(&self.jobs).map_err(StoreError::io_at(&self.jobs))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                // 列挙中に rename されたエントリ
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::io_at(&self.jobs)(err)),
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!(name = ?file_name, "ignoring non UTF-8 entry in jobs directory");
                continue;
            };
            if !keep(name) {
                continue;
            }
            match JobRecord::parse(name) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "ignoring entry in jobs directory"),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

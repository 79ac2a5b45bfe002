//! Errors - エラー型と分類
//!
//! - **ValidationError**: 作成時に弾く入力エラー（キューには入らない）
//! - **StoreError**: Job Store の操作エラー（NotFound / I/O / 壊れたレコード名など）
//!
//! タスク本体のエラーは `failure` モジュールの `TaskError` / `TaskFailure` で扱い、
//! dispatcher には伝播させません。

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::ids::{InvalidJobId, JobId};
use super::state::JobStatus;

/// A job payload that can never run; rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no task registered under '{0}'")]
    UnknownTask(String),

    #[error("task arguments must be a JSON object, got {0}")]
    ArgsNotObject(&'static str),

    #[error("argument name '{0}' is reserved for the injected job context")]
    ReservedArgument(String),

    #[error("arguments do not match task '{task}': {reason}")]
    InvalidArguments { task: String, reason: String },
}

/// The record name in `jobs/` does not follow the record grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed job record name '{0}'")]
pub struct RecordNameError(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error(transparent)]
    InvalidId(#[from] InvalidJobId),

    #[error(transparent)]
    MalformedRecord(#[from] RecordNameError),

    #[error("payload of job {job_id} is unreadable: {source}")]
    Payload {
        job_id: JobId,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// `map_err` helper that remembers which path failed.
    pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_mentions_the_path() {
        let err = StoreError::io_at(Path::new("/tmp/jobs/x.pending"))(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let msg = err.to_string();
        assert!(msg.contains("/tmp/jobs/x.pending"));
        assert!(msg.contains("denied"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn validation_error_is_transparent() {
        let err: StoreError = ValidationError::ReservedArgument("job_id".into()).into();
        assert_eq!(
            err.to_string(),
            "argument name 'job_id' is reserved for the injected job context"
        );
    }
}

//! Task failures.
//!
//! - `TaskError`: handler が返すエラー（`anyhow::Error`）。`?` で任意のエラーから変換でき、
//!   source chain と backtrace は anyhow が保持する。
//! - `TaskFailure`: worker が Result Recorder に渡す失敗情報（error log に書かれる）。

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// Error returned from a task handler.
pub type TaskError = anyhow::Error;

/// Why a job ended up in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler returned `Err`.
    Error,
    /// The handler panicked.
    Panic,
    /// No handler is registered for the payload's task kind.
    UnknownTask,
    /// The job never reached a worker slot.
    Dispatch,
    /// The dispatcher died while the job was running.
    Interrupted,
}

/// Failure detail persisted to the job's error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub job_id: JobId,
    pub task: String,
    pub kind: FailureKind,
    pub message: String,
    pub trace: String,
}

impl TaskFailure {
    pub fn new(
        job_id: JobId,
        task: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            task: task.into(),
            kind,
            message: message.into(),
            trace: String::new(),
        }
    }

    /// `trace` is the `{:?}` form of the error: its source chain, then the
    /// backtrace when one was captured.
    pub fn from_task_error(job_id: JobId, task: impl Into<String>, err: TaskError) -> Self {
        Self {
            trace: format!("{err:?}"),
            ..Self::new(job_id, task, FailureKind::Error, err.to_string())
        }
    }

    /// Build a failure from the payload of a caught panic.
    pub fn from_panic(job_id: JobId, task: impl Into<String>, panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_string()
        };
        Self::new(job_id, task, FailureKind::Panic, message)
    }

    /// Text appended to the error log.
    pub fn to_log_entry(&self) -> String {
        let mut entry = self.to_string();
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        entry
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskFailure('{}', '{}', {:?}): {}",
            self.job_id, self.task, self.kind, self.message
        )?;
        if !self.trace.is_empty() {
            write!(f, "\n{}", self.trace)?;
        }
        Ok(())
    }
}

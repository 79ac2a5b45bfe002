//! Job lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job; also the last field of its record name.
///
/// State transitions:
/// - Creating -> Pending（payload の書き込み完了後）
/// - Pending -> Running（dispatcher による claim）
/// - Running -> Done / Error（Result Recorder）
/// - Done / Error -> Pending（明示的な rerun のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Payload is being written; invisible to the dispatcher.
    Creating,

    /// Waiting to be claimed.
    Pending,

    /// Claimed and handed to a worker slot.
    Running,

    /// Handler returned successfully.
    Done,

    /// Handler failed; details are in the error log.
    Error,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Creating,
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Error,
    ];

    /// Suffix used in the record name.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Creating => "creating",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == suffix)
    }

    /// Is this a terminal state (only an explicit rerun leaves it)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub creating: usize,
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Creating => self.creating += 1,
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Done => self.done += 1,
            JobStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.creating + self.pending + self.running + self.done + self.error
    }
}

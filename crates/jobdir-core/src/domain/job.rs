//! Views of a job handed out by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::JobId;
use super::payload::JobPayload;
use super::record::JobRecord;
use super::state::JobStatus;

/// A job that has just been claimed (its record is now `running`).
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: JobId,
    pub payload: JobPayload,
    pub started: DateTime<Utc>,
}

/// Job status for producers (list / info screens).
///
/// Everything except `task_name` and `args` comes from the record name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub task_name: String,
    pub args: Map<String, Value>,
}

impl JobInfo {
    pub fn new(record: &JobRecord, payload: &JobPayload) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            created: record.created(),
            started: record.started,
            completed: record.completed,
            task_name: payload.task().to_string(),
            args: payload.args().clone(),
        }
    }
}

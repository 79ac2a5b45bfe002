//! Job record: the on-disk name of a job is its whole state.
//!
//! Record name grammar (`.` separated):
//! - `{created}.{ulid}.creating`
//! - `{created}.{ulid}.pending`
//! - `{created}.{ulid}.{started}.running`
//! - `{created}.{ulid}.{started}.{completed}.done`
//! - `{created}.{ulid}.{started}.{completed}.error`
//!
//! Transitions here are pure: they return the next record and leave the
//! rename to the store.

use chrono::{DateTime, SubsecRound, Utc};

use super::errors::{RecordNameError, StoreError};
use super::ids::{JobId, format_timestamp, parse_timestamp};
use super::state::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// A brand-new record whose payload is still being written.
    pub fn creating(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Creating,
            started: None,
            completed: None,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.id.created()
    }

    pub fn file_name(&self) -> String {
        let mut name = self.id.to_string();
        for at in [self.started, self.completed].into_iter().flatten() {
            name.push('.');
            name.push_str(&format_timestamp(&at));
        }
        name.push('.');
        name.push_str(self.status.as_str());
        name
    }

    pub fn parse(name: &str) -> Result<Self, RecordNameError> {
        let malformed = || RecordNameError(name.to_string());
        let fields: Vec<&str> = name.split('.').collect();
        if fields.len() < 3 {
            return Err(malformed());
        }
        let id: JobId = format!("{}.{}", fields[0], fields[1])
            .parse()
            .map_err(|_| malformed())?;
        let status = fields
            .last()
            .and_then(|suffix| JobStatus::from_suffix(suffix))
            .ok_or_else(malformed)?;
        let stamps = fields[2..fields.len() - 1]
            .iter()
            .map(|s| parse_timestamp(s).ok_or_else(malformed))
            .collect::<Result<Vec<_>, _>>()?;

        let expected_stamps = match status {
            JobStatus::Creating | JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Error => 2,
        };
        if stamps.len() != expected_stamps {
            return Err(malformed());
        }

        let record = Self {
            id,
            status,
            started: stamps.first().copied(),
            completed: stamps.get(1).copied(),
        };
        // 表記ゆれ（小文字の ULID、ゼロ埋めなしの日付など）は別名として扱わない
        if record.file_name() != name {
            return Err(malformed());
        }
        Ok(record)
    }

    /// Creating -> Pending.
    pub fn publish(&self) -> Result<Self, StoreError> {
        self.require(&[JobStatus::Creating], JobStatus::Pending)?;
        Ok(Self {
            status: JobStatus::Pending,
            ..self.clone()
        })
    }

    /// Pending -> Running, stamping the start time.
    pub fn claim(&self, now: DateTime<Utc>) -> Result<Self, StoreError> {
        self.require(&[JobStatus::Pending], JobStatus::Running)?;
        Ok(Self {
            status: JobStatus::Running,
            started: Some(now.trunc_subsecs(0)),
            completed: None,
            ..self.clone()
        })
    }

    /// Running -> Done / Error, stamping the completion time.
    pub fn finish(&self, outcome: JobStatus, now: DateTime<Utc>) -> Result<Self, StoreError> {
        if !outcome.is_terminal() {
            return Err(self.invalid(outcome));
        }
        self.require(&[JobStatus::Running], outcome)?;
        Ok(Self {
            status: outcome,
            completed: Some(now.trunc_subsecs(0)),
            ..self.clone()
        })
    }

    /// Done / Error -> Pending; the timeline is reset.
    pub fn requeue(&self) -> Result<Self, StoreError> {
        self.require(&[JobStatus::Done, JobStatus::Error], JobStatus::Pending)?;
        Ok(Self {
            id: self.id,
            status: JobStatus::Pending,
            started: None,
            completed: None,
        })
    }

    fn require(&self, allowed: &[JobStatus], to: JobStatus) -> Result<(), StoreError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: JobStatus) -> StoreError {
        StoreError::InvalidTransition {
            job_id: self.id,
            from: self.status,
            to,
        }
    }
}

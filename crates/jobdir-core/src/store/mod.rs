//! FileJobStore - ディレクトリだけで完結する永続キュー
//!
//! # 設計
//! - 1 job = `jobs/` 配下の 1 ファイル。状態はファイル名に埋め込む（`JobRecord`）
//! - 状態遷移はすべて `rename` 1 回。lock ファイルは使わない
//! - 同じレコードを 2 人が claim しようとしたら、rename が先に成功した方が勝つ
//!   （負けた方は source が消えているので ENOENT）
//!
//! # 制約
//! 1 つの store ディレクトリに対して dispatcher は 1 つだけ。
//! producer（create / list / rerun / delete）は何プロセスからでもよい。

mod error_log;
mod layout;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use self::layout::StoreLayout;
use crate::domain::{
    ClaimedJob, FailureKind, JobId, JobInfo, JobPayload, JobRecord, JobStatus, StatusCounts,
    StoreError, TaskFailure,
};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::typed::{PayloadCodec, Task};

/// 読み取り中にレコードが rename された場合の再試行回数
const READ_ATTEMPTS: usize = 3;

/// Handle on a store directory.
///
/// Cloning shares the handle; [`FileJobStore::reopen`] makes an independent
/// one on the same root (what each worker slot uses).
#[derive(Clone)]
pub struct FileJobStore {
    layout: Arc<StoreLayout>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for FileJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJobStore")
            .field("root", &self.layout.root())
            .finish_non_exhaustive()
    }
}

impl FileJobStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(root, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        root: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::open_with(root, clock, ids)
    }

    pub fn open_with(
        root: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root.as_ref());
        layout.ensure()?;
        Ok(Self {
            layout: Arc::new(layout),
            clock,
            ids,
        })
    }

    /// A fresh handle on the same root.
    ///
    /// The id generator is shared so ids stay monotonic across handles.
    pub fn reopen(&self) -> Result<Self, StoreError> {
        Self::open_with(
            self.layout.root(),
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        )
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Enqueue a typed task.
    pub fn create<T: Task>(&self, task: &T) -> Result<JobId, StoreError> {
        let payload = PayloadCodec::encode(task)?;
        self.create_payload(payload)
    }

    /// Enqueue a payload: write `{id}.creating`, flush it, then publish it
    /// as `{id}.pending`. Nobody claims a record before its payload is on disk.
    pub fn create_payload(&self, payload: JobPayload) -> Result<JobId, StoreError> {
        let id = self.ids.generate_job_id();
        let bytes = payload
            .to_bytes()
            .map_err(|source| StoreError::Payload { job_id: id, source })?;

        let creating = JobRecord::creating(id);
        let path = self.layout.record_path(&creating);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(StoreError::io_at(&path))?;
        file.write_all(&bytes).map_err(StoreError::io_at(&path))?;
        file.sync_all().map_err(StoreError::io_at(&path))?;
        drop(file);

        let pending = creating.publish()?;
        self.rename(&creating, &pending)?;
        debug!(job_id = %id, task = payload.task(), "job created");
        Ok(id)
    }

    /// Claim the earliest pending job (creation order) by renaming it to
    /// `running`. Returns `None` when nothing is pending. Never blocks.
    pub fn claim_next_pending(&self) -> Result<Option<ClaimedJob>, StoreError> {
        let pending = self
            .layout
            .scan()?
            .into_iter()
            .filter(|record| record.status == JobStatus::Pending);

        for record in pending {
            let now = self.clock.now();
            let running = record.claim(now)?;
            match self.try_rename(&record, &running) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(job_id = %record.id, "pending record vanished, trying next");
                    continue;
                }
                Err(err) => return Err(StoreError::io_at(&self.layout.record_path(&record))(err)),
            }

            match self.read_payload(&running) {
                Ok(payload) => {
                    return Ok(Some(ClaimedJob {
                        id: running.id,
                        payload,
                        started: running.started.unwrap_or(now),
                    }));
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(job_id = %running.id, "claimed record vanished, trying next");
                }
                Err(err) => {
                    warn!(job_id = %running.id, error = %err, "claimed job has an unreadable payload");
                    let failure =
                        TaskFailure::new(running.id, "?", FailureKind::Dispatch, err.to_string());
                    self.fail_with_note(&running.id, &failure);
                }
            }
        }
        Ok(None)
    }

    /// running -> done
    pub fn mark_done(&self, id: &JobId) -> Result<(), StoreError> {
        self.finish(id, JobStatus::Done)
    }

    /// running -> error
    pub fn mark_failed(&self, id: &JobId) -> Result<(), StoreError> {
        self.finish(id, JobStatus::Error)
    }

    /// All job ids in creation order.
    pub fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        let mut ids: Vec<JobId> = self.layout.scan()?.into_iter().map(|r| r.id).collect();
        ids.dedup();
        Ok(ids)
    }

    pub fn get_info(&self, id: &JobId) -> Result<JobInfo, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let record = self.find(id)?;
            match self.read_payload(&record) {
                Ok(payload) => return Ok(JobInfo::new(&record, &payload)),
                // レコードが読む直前に rename された
                Err(StoreError::NotFound(_)) if attempt < READ_ATTEMPTS => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub fn status(&self, id: &JobId) -> Result<JobStatus, StoreError> {
        Ok(self.find(id)?.status)
    }

    /// done / error -> pending. Clears the error log; the payload is kept.
    pub fn rerun(&self, id: &JobId) -> Result<(), StoreError> {
        let record = self.find(id)?;
        let pending = record.requeue()?;
        self.remove_log(id)?;
        self.rename(&record, &pending)?;
        info!(job_id = %id, from = %record.status, "job requeued");
        Ok(())
    }

    /// Remove the record and its error log, whatever the state.
    pub fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let record = self.find(id)?;
        let path = self.layout.record_path(&record);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(err) => return Err(StoreError::io_at(&path)(err)),
        }
        self.remove_log(id)?;
        if record.status == JobStatus::Running {
            warn!(job_id = %id, "deleted a running job; its result will be dropped");
        }
        debug!(job_id = %id, "job deleted");
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.layout.scan()?.len())
    }

    pub fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for record in self.layout.scan()? {
            counts.add(record.status);
        }
        Ok(counts)
    }

    /// Move every `running` record to `error` with an "interrupted" note.
    ///
    /// Only valid while no dispatcher is running on this root: with a single
    /// dispatcher, every running record at startup belongs to a dead one.
    /// `creating` records are left alone.
    pub fn recover_interrupted(&self) -> Result<Vec<JobId>, StoreError> {
        let mut recovered = Vec::new();
        for record in self.layout.scan()? {
            if record.status != JobStatus::Running {
                continue;
            }
            let task = self
                .read_payload(&record)
                .map(|payload| payload.task().to_string())
                .unwrap_or_else(|_| "?".to_string());
            let failure = TaskFailure::new(
                record.id,
                task,
                FailureKind::Interrupted,
                "interrupted: the dispatcher stopped while the job was running",
            );
            if self.fail_with_note(&record.id, &failure) {
                warn!(job_id = %record.id, "interrupted job moved to error");
                recovered.push(record.id);
            }
        }
        Ok(recovered)
    }

    /// running -> error, then note why in the error log.
    ///
    /// Errors are logged, not returned; false when the record was not moved.
    /// The log is only written once the record is in `error`, so a record
    /// that vanished meanwhile leaves no sidecar behind.
    fn fail_with_note(&self, id: &JobId, failure: &TaskFailure) -> bool {
        match self.finish(id, JobStatus::Error) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                debug!(job_id = %id, "record vanished before it could be failed");
                return false;
            }
            Err(err) => {
                warn!(job_id = %id, error = %err, "failed to move job to error");
                return false;
            }
        }
        if let Err(err) = self.append_error(id, &failure.to_log_entry()) {
            warn!(job_id = %id, error = %err, "failed to write error log");
        }
        true
    }

    fn finish(&self, id: &JobId, outcome: JobStatus) -> Result<(), StoreError> {
        let record = self.find(id)?;
        if record.status != JobStatus::Running {
            return Err(StoreError::NotFound(*id));
        }
        let finished = record.finish(outcome, self.clock.now())?;
        self.rename(&record, &finished)?;
        debug!(job_id = %id, status = %outcome, "job finished");
        Ok(())
    }

    /// The current record of `id`.
    fn find(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        let mut records = self.layout.scan_id(id)?;
        if records.len() > 1 {
            warn!(job_id = %id, count = records.len(), "more than one record for a job");
        }
        records.pop().ok_or(StoreError::NotFound(*id))
    }

    fn read_payload(&self, record: &JobRecord) -> Result<JobPayload, StoreError> {
        let path = self.layout.record_path(record);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(record.id));
            }
            Err(err) => return Err(StoreError::io_at(&path)(err)),
        };
        JobPayload::from_slice(&bytes).map_err(|source| StoreError::Payload {
            job_id: record.id,
            source,
        })
    }

    /// Rename `from` to `to`; a vanished source is `NotFound`.
    fn rename(&self, from: &JobRecord, to: &JobRecord) -> Result<(), StoreError> {
        match self.try_rename(from, to) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(from.id)),
            Err(err) => Err(StoreError::io_at(&self.layout.record_path(from))(err)),
        }
    }

    fn try_rename(&self, from: &JobRecord, to: &JobRecord) -> io::Result<()> {
        fs::rename(self.layout.record_path(from), self.layout.record_path(to))
    }
}

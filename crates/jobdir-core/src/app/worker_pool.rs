//! WorkerPool - 固定数の worker slot
//!
//! # 構造
//! - `size` 個の tokio task が 1 本の mpsc channel を共有して Submission を受け取る
//! - 各 slot は起動時に一度だけ `WorkerContext`（自分専用の store handle）を作る
//! - handler は slot とは別の task で走らせ、panic を JoinError として捕まえる
//!
//! channel を閉じる（`close_and_join`）と、各 slot は手元の job を終えてから抜ける。

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::recorder;
use crate::domain::{ClaimedJob, FailureKind, StoreError, TaskFailure, ValidationError};
use crate::store::FileJobStore;
use crate::typed::{JobContext, TypedRegistry, WorkerContext};

/// Runs once per worker slot, after its context is built.
pub type WorkerInitializer = Arc<dyn Fn(&WorkerContext) + Send + Sync>;

/// A claimed job plus the concurrency slot it occupies.
#[derive(Debug)]
pub struct Submission {
    pub job: ClaimedJob,
    pub permit: OwnedSemaphorePermit,
}

/// Returned when every worker slot has stopped; hands the submission back.
#[derive(Debug, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed(pub Submission);

pub struct WorkerPool {
    sender: mpsc::Sender<Submission>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` worker slots.
    ///
    /// Each slot gets its own handle on `store`'s root; `initializer` runs
    /// once per slot before any job is accepted.
    pub fn spawn(
        size: usize,
        store: &FileJobStore,
        registry: Arc<TypedRegistry>,
        initializer: Option<WorkerInitializer>,
    ) -> Result<Self, StoreError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(size);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut joins = Vec::with_capacity(size);
        for worker_id in 0..size {
            let worker = Arc::new(WorkerContext::new(worker_id, store.reopen()?));
            if let Some(init) = &initializer {
                init(&worker);
            }
            let registry = Arc::clone(&registry);
            let receiver = Arc::clone(&receiver);
            joins.push(tokio::spawn(async move {
                worker_loop(worker, registry, receiver).await;
            }));
        }

        Ok(Self { sender, joins })
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    /// Hand a job to the next free slot.
    pub async fn submit(&self, submission: Submission) -> Result<(), PoolClosed> {
        self.sender
            .send(submission)
            .await
            .map_err(|mpsc::error::SendError(submission)| PoolClosed(submission))
    }

    /// Stop accepting jobs and wait for every slot to finish its current one.
    pub async fn close_and_join(self) {
        drop(self.sender);
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "worker slot ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker: Arc<WorkerContext>,
    registry: Arc<TypedRegistry>,
    receiver: Arc<Mutex<mpsc::Receiver<Submission>>>,
) {
    debug!(worker = worker.worker_id(), "worker slot started");
    loop {
        // 受信中だけロックを持つ（実行中は他の slot が受け取れる）
        let next = receiver.lock().await.recv().await;
        let Some(Submission { job, permit }) = next else {
            break;
        };

        debug!(worker = worker.worker_id(), job_id = %job.id, task = job.payload.task(), "job started");
        let outcome = execute(&registry, &worker, &job).await;
        recorder::record(worker.store(), job.id, outcome, permit).await;
    }
    debug!(worker = worker.worker_id(), "worker slot stopped");
}

/// Run one job's handler; every way it can go wrong becomes a `TaskFailure`.
pub(crate) async fn execute(
    registry: &TypedRegistry,
    worker: &Arc<WorkerContext>,
    job: &ClaimedJob,
) -> Result<(), TaskFailure> {
    let task = job.payload.task().to_string();
    let Some(handler) = registry.get(&task) else {
        let message = ValidationError::UnknownTask(task.clone()).to_string();
        return Err(TaskFailure::new(job.id, task, FailureKind::UnknownTask, message));
    };

    let ctx = JobContext::new(job.id, Arc::clone(worker));
    let args = job.payload.args_value();
    let run = tokio::spawn(async move { handler.handle_dyn(ctx, args).await });

    match run.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskFailure::from_task_error(job.id, task, err)),
        Err(err) if err.is_panic() => Err(TaskFailure::from_panic(job.id, task, err.into_panic())),
        Err(err) => Err(TaskFailure::new(
            job.id,
            task,
            FailureKind::Dispatch,
            err.to_string(),
        )),
    }
}

//! テスト用の Task / Handler / helper

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use ulid::Ulid;

use crate::domain::{JobId, JobStatus, TaskError};
use crate::ports::FixedClock;
use crate::store::FileJobStore;
use crate::typed::{Handler, JobContext, Task, WorkerContext};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub(crate) fn any_job_id() -> JobId {
    JobId::new(t0(), Ulid::new())
}

pub(crate) fn temp_store() -> (TempDir, FileJobStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileJobStore::open(dir.path()).unwrap();
    (dir, store)
}

/// Store whose record timestamps come from a hand-driven clock starting at `t0()`.
pub(crate) fn fixed_store() -> (TempDir, FileJobStore, Arc<FixedClock>) {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(t0()));
    let store = FileJobStore::open_with_clock(dir.path(), clock.clone()).unwrap();
    (dir, store, clock)
}

pub(crate) fn worker_context() -> (TempDir, Arc<WorkerContext>) {
    let (dir, store) = temp_store();
    (dir, Arc::new(WorkerContext::new(0, store)))
}

/// Poll until `id` reaches `status`; panics after five seconds.
pub(crate) async fn wait_for_status(store: &FileJobStore, id: &JobId, status: JobStatus) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.status(id).ok() == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if waited.is_err() {
        panic!(
            "job {id} never reached {status}, last seen {:?}",
            store.status(id)
        );
    }
}

// --- tasks ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Greet {
    pub name: String,
}

impl Task for Greet {
    const TYPE: &'static str = "test.greet.v1";
}

#[derive(Default)]
pub(crate) struct GreetHandler {
    pub greeted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Handler<Greet> for GreetHandler {
    async fn handle(&self, _ctx: JobContext, task: Greet) -> Result<(), TaskError> {
        self.greeted.lock().unwrap().push(task.name);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecordsContext {}

impl Task for RecordsContext {
    const TYPE: &'static str = "test.records_context.v1";
}

/// Remembers what each execution saw in its context.
#[derive(Default)]
pub(crate) struct RecordsContextHandler {
    pub seen: Arc<Mutex<Vec<SeenContext>>>,
}

#[derive(Debug, Clone)]
pub(crate) struct SeenContext {
    pub job_id: JobId,
    pub worker_id: usize,
    pub root: PathBuf,
    pub status: Option<JobStatus>,
}

#[async_trait]
impl Handler<RecordsContext> for RecordsContextHandler {
    async fn handle(&self, ctx: JobContext, _task: RecordsContext) -> Result<(), TaskError> {
        let status = ctx.store().status(&ctx.job_id()).ok();
        self.seen.lock().unwrap().push(SeenContext {
            job_id: ctx.job_id(),
            worker_id: ctx.worker_id(),
            root: ctx.store().root().to_path_buf(),
            status,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Fail {
    pub message: String,
}

impl Task for Fail {
    const TYPE: &'static str = "test.fail.v1";
}

pub(crate) struct FailHandler;

#[async_trait]
impl Handler<Fail> for FailHandler {
    async fn handle(&self, _ctx: JobContext, task: Fail) -> Result<(), TaskError> {
        Err(anyhow::anyhow!(task.message))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Explode {
    pub message: String,
}

impl Task for Explode {
    const TYPE: &'static str = "test.explode.v1";
}

pub(crate) struct ExplodeHandler;

#[async_trait]
impl Handler<Explode> for ExplodeHandler {
    async fn handle(&self, _ctx: JobContext, task: Explode) -> Result<(), TaskError> {
        panic!("{}", task.message);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Nap {
    pub millis: u64,
}

impl Task for Nap {
    const TYPE: &'static str = "test.nap.v1";
}

/// Tracks how many executions are inside `handle` at once.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct NapHandler {
    pub gauge: ConcurrencyGauge,
}

#[async_trait]
impl Handler<Nap> for NapHandler {
    async fn handle(&self, _ctx: JobContext, task: Nap) -> Result<(), TaskError> {
        self.gauge.enter();
        tokio::time::sleep(Duration::from_millis(task.millis)).await;
        self.gauge.leave();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WriteFile {
    pub path: PathBuf,
    pub contents: String,
}

impl Task for WriteFile {
    const TYPE: &'static str = "test.write_file.v1";
}

pub(crate) struct WriteFileHandler;

#[async_trait]
impl Handler<WriteFile> for WriteFileHandler {
    async fn handle(&self, _ctx: JobContext, task: WriteFile) -> Result<(), TaskError> {
        std::fs::write(&task.path, task.contents)?;
        Ok(())
    }
}

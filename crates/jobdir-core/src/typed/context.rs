//! Worker / Job context - handler に明示的に渡す実行コンテキスト
//!
//! プロセス全体で共有するグローバルな store handle は持たない。
//! worker slot ごとに初期化時に一度だけ `WorkerContext` を作り、
//! 各 job の実行時に `JobContext` として handler に渡す。

use std::sync::Arc;

use crate::domain::JobId;
use crate::store::FileJobStore;

/// Per-slot state built once by the pool initializer.
#[derive(Clone)]
pub struct WorkerContext {
    worker_id: usize,
    store: FileJobStore,
}

impl WorkerContext {
    pub fn new(worker_id: usize, store: FileJobStore) -> Self {
        Self { worker_id, store }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// This slot's own store handle.
    pub fn store(&self) -> &FileJobStore {
        &self.store
    }
}

/// What a handler receives besides its typed arguments.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    worker: Arc<WorkerContext>,
}

impl JobContext {
    pub fn new(job_id: JobId, worker: Arc<WorkerContext>) -> Self {
        Self { job_id, worker }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn worker_id(&self) -> usize {
        self.worker.worker_id()
    }

    pub fn store(&self) -> &FileJobStore {
        self.worker.store()
    }
}

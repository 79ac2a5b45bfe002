//! Dispatcher - store を監視して worker pool に job を流す制御ループ
//!
//! # ループ 1 回分
//! 1. 停止要求があれば抜ける
//! 2. semaphore の permit を 1 つ取る（pool が埋まっていれば待つ。唯一の背圧）
//! 3. pending の先頭を claim する（blocking thread で）
//! 4. なければ permit を返して `poll_interval` 眠る（停止要求で起きる）
//! 5. あれば `{job, permit}` を pool に渡す
//!
//! permit を claim より先に取るので、`running` のレコード数は `pool_size` を超えない。
//! 停止時は pool を閉じて、実行中の job が終わるのを待つ（中断はしない）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::blocking;
use super::config::DispatcherConfig;
use super::recorder;
use super::worker_pool::{PoolClosed, Submission, WorkerInitializer, WorkerPool};
use crate::domain::{FailureKind, StoreError, TaskFailure};
use crate::store::FileJobStore;
use crate::typed::TypedRegistry;

pub struct Dispatcher {
    store: FileJobStore,
    registry: Arc<TypedRegistry>,
    config: DispatcherConfig,
    initializer: Option<WorkerInitializer>,
}

/// Handle on a spawned dispatcher.
///
/// Dropping it without calling [`DispatcherHandle::stop`] also stops the
/// dispatcher (the shutdown sender goes away), but nobody waits for it.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<(), StoreError>>,
    exited: Option<Result<(), StoreError>>,
}

impl DispatcherHandle {
    /// Ask the loop to stop; running jobs still finish.
    pub fn request_stop(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Resolve once the loop has exited and drained, whether it was asked
    /// to stop or not. Cancel-safe, so it can sit in a `select!`.
    pub async fn exited(&mut self) {
        if self.exited.is_none() {
            let joined = (&mut self.join).await;
            self.exited = Some(match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => {
                    warn!(error = %err, "dispatcher task was cancelled");
                    Ok(())
                }
            });
        }
    }

    /// Stop and wait until every in-flight job has been recorded.
    pub async fn stop(mut self) -> Result<(), StoreError> {
        self.request_stop();
        self.exited().await;
        self.exited.take().unwrap_or(Ok(()))
    }

    pub fn is_finished(&self) -> bool {
        self.exited.is_some() || self.join.is_finished()
    }
}

impl Dispatcher {
    pub fn new(
        store: FileJobStore,
        registry: Arc<TypedRegistry>,
        config: DispatcherConfig,
        initializer: Option<WorkerInitializer>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            initializer,
        }
    }

    /// Run the loop on its own task.
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        DispatcherHandle {
            shutdown_tx,
            join,
            exited: None,
        }
    }

    /// Run until `shutdown` turns true (or its sender is dropped), then drain.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        let pool_size = self.config.effective_pool_size();
        let interval = self.config.poll_interval();

        if self.config.recover_interrupted {
            match blocking(&self.store, |s| s.recover_interrupted()).await {
                Ok(recovered) if !recovered.is_empty() => {
                    warn!(count = recovered.len(), "failed jobs left running by a previous dispatcher");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "failed to recover interrupted jobs"),
            }
        }

        let semaphore = Arc::new(Semaphore::new(pool_size));
        let pool = WorkerPool::spawn(
            pool_size,
            &self.store,
            Arc::clone(&self.registry),
            self.initializer.clone(),
        )?;
        info!(
            root = %self.store.root().display(),
            pool_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match blocking(&self.store, |s| s.claim_next_pending()).await {
                Ok(Some(job)) => {
                    debug!(job_id = %job.id, task = job.payload.task(), "job claimed");
                    if let Err(PoolClosed(Submission { job, permit })) =
                        pool.submit(Submission { job, permit }).await
                    {
                        error!(job_id = %job.id, "worker pool refused the job");
                        let failure = TaskFailure::new(
                            job.id,
                            job.payload.task(),
                            FailureKind::Dispatch,
                            "worker pool is closed",
                        );
                        recorder::record(&self.store, job.id, Err(failure), permit).await;
                    }
                }
                Ok(None) => {
                    drop(permit);
                    if idle(&mut shutdown, interval).await {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to claim next job");
                    drop(permit);
                    if idle(&mut shutdown, interval).await {
                        break;
                    }
                }
            }
        }

        info!("dispatcher stopping, waiting for running jobs");
        pool.close_and_join().await;
        info!("dispatcher stopped");
        Ok(())
    }
}

/// Sleep for `interval`, waking early on a stop request.
/// Returns true when the loop should stop.
async fn idle(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobPayload, JobStatus};
    use crate::testing::{
        Explode, ExplodeHandler, Fail, FailHandler, Greet, GreetHandler, Nap, NapHandler,
        WriteFile, WriteFileHandler, temp_store, wait_for_status,
    };
    use serde_json::json;

    fn config(pool_size: usize) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_pool_size(pool_size)
            .with_poll_interval(Duration::from_millis(10))
    }

    fn start(store: &FileJobStore, registry: TypedRegistry, pool_size: usize) -> DispatcherHandle {
        Dispatcher::new(store.clone(), Arc::new(registry), config(pool_size), None).spawn()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failing_task_ends_in_error_with_its_message() {
        let (_dir, store) = temp_store();
        let mut registry = TypedRegistry::new();
        registry.register::<Fail, _>(FailHandler).unwrap();
        let id = store.create(&Fail { message: "boom".into() }).unwrap();

        let handle = start(&store, registry, 2);
        wait_for_status(&store, &id, JobStatus::Error).await;
        handle.stop().await.unwrap();

        assert!(store.read_error(&id).unwrap().contains("boom"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writing_task_ends_done_with_output_visible() {
        let (dir, store) = temp_store();
        let mut registry = TypedRegistry::new();
        registry.register::<WriteFile, _>(WriteFileHandler).unwrap();
        let target = dir.path().join("out.txt");
        let id = store
            .create(&WriteFile {
                path: target.clone(),
                contents: "hello".into(),
            })
            .unwrap();

        let handle = start(&store, registry, 2);
        wait_for_status(&store, &id, JobStatus::Done).await;
        handle.stop().await.unwrap();

        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello");
        assert_eq!(store.read_error(&id).unwrap(), "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn five_jobs_on_two_slots_run_at_most_two_at_once() {
        let (_dir, store) = temp_store();
        let handler = NapHandler::default();
        let gauge = handler.gauge.clone();
        let mut registry = TypedRegistry::new();
        registry.register::<Nap, _>(handler).unwrap();
        let ids: Vec<JobId> = (0..5)
            .map(|_| store.create(&Nap { millis: 100 }).unwrap())
            .collect();

        let handle = start(&store, registry, 2);
        for id in &ids {
            wait_for_status(&store, id, JobStatus::Done).await;
        }
        handle.stop().await.unwrap();

        assert_eq!(gauge.finished(), 5);
        assert!(gauge.max() <= 2, "max concurrency was {}", gauge.max());
        assert!(gauge.max() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_lets_running_jobs_finish() {
        let (_dir, store) = temp_store();
        let handler = NapHandler::default();
        let gauge = handler.gauge.clone();
        let mut registry = TypedRegistry::new();
        registry.register::<Nap, _>(handler).unwrap();
        let id = store.create(&Nap { millis: 300 }).unwrap();

        let handle = start(&store, registry, 1);
        wait_for_status(&store, &id, JobStatus::Running).await;
        handle.stop().await.unwrap();

        assert_eq!(store.status(&id).unwrap(), JobStatus::Done);
        assert_eq!(gauge.finished(), 1);
    }

    #[tokio::test]
    async fn stop_wakes_an_idle_dispatcher() {
        let (_dir, store) = temp_store();
        let config = config(1).with_poll_interval(Duration::from_secs(60));
        let handle =
            Dispatcher::new(store.clone(), Arc::new(TypedRegistry::new()), config, None).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(5), handle.stop()).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn exited_resolves_after_a_stop_request() {
        let (_dir, store) = temp_store();
        let config = config(1).with_poll_interval(Duration::from_secs(60));
        let mut handle =
            Dispatcher::new(store.clone(), Arc::new(TypedRegistry::new()), config, None).spawn();

        let early = tokio::time::timeout(Duration::from_millis(50), handle.exited()).await;
        assert!(early.is_err());
        assert!(!handle.is_finished());

        handle.request_stop();
        let exited = tokio::time::timeout(Duration::from_secs(5), handle.exited()).await;
        assert!(exited.is_ok());
        assert!(handle.is_finished());
        assert!(handle.stop().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unknown_task_is_recorded_as_error() {
        let (_dir, store) = temp_store();
        let payload = JobPayload::new("nobody.home.v1", json!({})).unwrap();
        let id = store.create_payload(payload).unwrap();

        let handle = start(&store, TypedRegistry::new(), 1);
        wait_for_status(&store, &id, JobStatus::Error).await;
        handle.stop().await.unwrap();

        let log = store.read_error(&id).unwrap();
        assert!(log.contains("UnknownTask"));
        assert!(log.contains("nobody.home.v1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_task_does_not_take_the_pool_down() {
        let (_dir, store) = temp_store();
        let mut registry = TypedRegistry::new();
        registry.register::<Explode, _>(ExplodeHandler).unwrap();
        registry.register::<Greet, _>(GreetHandler::default()).unwrap();
        let exploded = store.create(&Explode { message: "kaboom".into() }).unwrap();
        let greeted = store.create(&Greet { name: "after".into() }).unwrap();

        let handle = start(&store, registry, 1);
        wait_for_status(&store, &exploded, JobStatus::Error).await;
        wait_for_status(&store, &greeted, JobStatus::Done).await;
        handle.stop().await.unwrap();

        assert!(store.read_error(&exploded).unwrap().contains("kaboom"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn running_records_from_a_dead_dispatcher_are_failed_on_startup() {
        let (_dir, store) = temp_store();
        let id = store.create(&Greet { name: "orphan".into() }).unwrap();
        store.claim_next_pending().unwrap();

        let mut registry = TypedRegistry::new();
        registry.register::<Greet, _>(GreetHandler::default()).unwrap();
        let handle = start(&store, registry, 1);
        wait_for_status(&store, &id, JobStatus::Error).await;
        handle.stop().await.unwrap();

        assert!(store.read_error(&id).unwrap().contains("interrupted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dispatcher_keeps_running_when_startup_recovery_fails() {
        let (dir, store) = temp_store();
        let jobs = dir.path().join("jobs");
        std::fs::remove_dir(&jobs).unwrap();

        let mut registry = TypedRegistry::new();
        registry.register::<Greet, _>(GreetHandler::default()).unwrap();
        let handle = start(&store, registry, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        std::fs::create_dir_all(&jobs).unwrap();
        let id = store.create(&Greet { name: "late".into() }).unwrap();
        wait_for_status(&store, &id, JobStatus::Done).await;
        handle.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_slot_runs_jobs_in_creation_order() {
        let (_dir, store) = temp_store();
        let handler = GreetHandler::default();
        let greeted = Arc::clone(&handler.greeted);
        let mut registry = TypedRegistry::new();
        registry.register::<Greet, _>(handler).unwrap();
        let ids: Vec<JobId> = ["a", "b", "c"]
            .iter()
            .map(|name| store.create(&Greet { name: (*name).into() }).unwrap())
            .collect();

        let handle = start(&store, registry, 1);
        for id in &ids {
            wait_for_status(&store, id, JobStatus::Done).await;
        }
        handle.stop().await.unwrap();

        assert_eq!(*greeted.lock().unwrap(), vec!["a", "b", "c"]);
    }
}

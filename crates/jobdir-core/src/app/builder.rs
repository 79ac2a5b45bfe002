//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::config::DispatcherConfig;
use super::dispatcher::{Dispatcher, DispatcherHandle};
use super::worker_pool::WorkerInitializer;
use crate::domain::{JobId, JobPayload, StoreError};
use crate::store::FileJobStore;
use crate::typed::{Handler, PayloadCodec, RegistryError, Task, TypedRegistry, WorkerContext};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(FileJobStore::open("/srv/queue")?)
///     .config(DispatcherConfig::default().with_pool_size(4))
///     .register::<TrainQuantifier, _>(TrainQuantifierHandler)?
///     .expect_tasks(&["lab.quantifier.train.v1"])
///     .build()?;
/// let dispatcher = app.start();
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される task_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    store: FileJobStore,
    registry: TypedRegistry,
    config: DispatcherConfig,
    initializer: Option<WorkerInitializer>,
    expected_tasks: Option<Vec<String>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),
}

impl AppBuilder {
    pub fn new(store: FileJobStore) -> Self {
        Self {
            store,
            registry: TypedRegistry::new(),
            config: DispatcherConfig::default(),
            initializer: None,
            expected_tasks: None,
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// worker slot ごとに一度だけ呼ばれる初期化処理
    pub fn worker_initializer(
        mut self,
        init: impl Fn(&WorkerContext) + Send + Sync + 'static,
    ) -> Self {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - expect_tasks() で設定された task_type が全て登録されているかチェック
    /// - 不足があれば BuildError::MissingTaskTypes を返す
    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = self.registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|x| !registered_types.contains(x))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        Ok(App {
            store: self.store,
            registry: Arc::new(self.registry),
            config: self.config,
            initializer: self.initializer,
        })
    }
}

/// App は store と registry を束ねたもの
///
/// producer 側（submit）と dispatcher の起動口を兼ねる。
pub struct App {
    store: FileJobStore,
    registry: Arc<TypedRegistry>,
    config: DispatcherConfig,
    initializer: Option<WorkerInitializer>,
}

impl App {
    pub fn store(&self) -> &FileJobStore {
        &self.store
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Enqueue a raw payload after checking it against the registry.
    pub fn submit(&self, payload: JobPayload) -> Result<JobId, StoreError> {
        self.registry.validate(&payload)?;
        self.store.create_payload(payload)
    }

    /// Enqueue a typed task; its kind must be registered.
    pub fn submit_task<T: Task>(&self, task: &T) -> Result<JobId, StoreError> {
        self.submit(PayloadCodec::encode(task)?)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.store.clone(),
            Arc::clone(&self.registry),
            self.config.clone(),
            self.initializer.clone(),
        )
    }

    /// Spawn the dispatcher.
    pub fn start(&self) -> DispatcherHandle {
        self.dispatcher().spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, ValidationError};
    use crate::testing::{Greet, GreetHandler, RecordsContext, temp_store, wait_for_status};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_build_success() {
        let (_dir, store) = temp_store();
        let app = AppBuilder::new(store)
            .register::<Greet, _>(GreetHandler::default())
            .unwrap()
            .expect_tasks(&[Greet::TYPE])
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_missing_task_types() {
        let (_dir, store) = temp_store();
        let app = AppBuilder::new(store)
            .register::<Greet, _>(GreetHandler::default())
            .unwrap()
            .expect_tasks(&[Greet::TYPE, RecordsContext::TYPE])
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingTaskTypes(missing)) if missing == vec![RecordsContext::TYPE.to_string()]
        ));
    }

    #[test]
    fn test_build_no_expect_tasks() {
        let (_dir, store) = temp_store();
        let app = AppBuilder::new(store)
            .register::<Greet, _>(GreetHandler::default())
            .unwrap()
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn submit_rejects_unregistered_and_malformed_jobs() {
        let (_dir, store) = temp_store();
        let app = AppBuilder::new(store)
            .register::<Greet, _>(GreetHandler::default())
            .unwrap()
            .build()
            .unwrap();

        let unknown = JobPayload::new("nobody.home.v1", json!({})).unwrap();
        assert!(matches!(
            app.submit(unknown),
            Err(StoreError::Validation(ValidationError::UnknownTask(_)))
        ));

        let wrong_shape = JobPayload::new(Greet::TYPE, json!({ "name": 1 })).unwrap();
        assert!(matches!(
            app.submit(wrong_shape),
            Err(StoreError::Validation(ValidationError::InvalidArguments { .. }))
        ));

        assert!(matches!(
            app.submit_task(&RecordsContext {}),
            Err(StoreError::Validation(ValidationError::UnknownTask(_)))
        ));
        assert_eq!(app.store().count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn started_app_runs_submitted_jobs() {
        let (_dir, store) = temp_store();
        let initialized = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&initialized);
        let app = AppBuilder::new(store)
            .config(
                DispatcherConfig::default()
                    .with_pool_size(2)
                    .with_poll_interval(Duration::from_millis(10)),
            )
            .register::<Greet, _>(GreetHandler::default())
            .unwrap()
            .worker_initializer(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let id = app.submit_task(&Greet { name: "a".into() }).unwrap();
        let handle = app.start();
        wait_for_status(app.store(), &id, JobStatus::Done).await;
        handle.stop().await.unwrap();

        assert_eq!(initialized.load(Ordering::SeqCst), 2);
    }
}

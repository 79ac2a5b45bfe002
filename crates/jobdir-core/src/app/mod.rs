//! App - アプリケーション層
//!
//! store と registry を組み合わせて queue を動かす。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Dispatcher**: pending を claim して pool に渡す制御ループ
//! - **WorkerPool**: 固定数の worker slot
//! - **recorder**: 実行結果を done / error に反映

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod recorder;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::DispatcherConfig;
pub use self::dispatcher::{Dispatcher, DispatcherHandle};
pub use self::worker_pool::{PoolClosed, Submission, WorkerInitializer, WorkerPool};

use std::io;

use crate::domain::StoreError;
use crate::store::FileJobStore;

/// Run a synchronous store call on the blocking thread pool.
///
/// A panic inside `f` is resumed on the caller.
pub(crate) async fn blocking<T, F>(store: &FileJobStore, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&FileJobStore) -> Result<T, StoreError> + Send + 'static,
{
    let handle = store.clone();
    match tokio::task::spawn_blocking(move || f(&handle)).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(StoreError::Io {
            path: store.root().to_path_buf(),
            source: io::Error::other(err),
        }),
    }
}

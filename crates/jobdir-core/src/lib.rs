//! jobdir-core
//!
//! ディレクトリ 1 つで完結する永続 job queue と、それを消化する dispatcher。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, JobStatus, JobRecord, JobPayload, errors, failures）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **store**: FileJobStore（rename だけで状態遷移する Job Store）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry, PayloadCodec）
//! - **app**: アプリケーションロジック（AppBuilder, Dispatcher, WorkerPool, recorder）

pub mod app;
pub mod domain;
pub mod ports;
pub mod store;
pub mod typed;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{App, AppBuilder, DispatcherConfig, DispatcherHandle};
pub use domain::{JobId, JobInfo, JobPayload, JobStatus, StoreError, TaskError};
pub use store::FileJobStore;
pub use typed::{Handler, JobContext, Task};

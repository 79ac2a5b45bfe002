//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::codec::PayloadCodec;
use super::context::JobContext;
use super::task::Task;
use crate::domain::{TaskError, ValidationError};

/// Handler は Task を実行する
///
/// job id と store handle は引数ではなく `JobContext` で受け取る。
/// シグネチャで強制されるので「job id / store を受け取らない関数」は登録できない。
///
/// # 使用例
/// ```ignore
/// struct GreetHandler;
///
/// #[async_trait]
/// impl Handler<Greet> for GreetHandler {
///     async fn handle(&self, ctx: JobContext, task: Greet) -> Result<(), TaskError> {
///         tracing::info!(job_id = %ctx.job_id(), "hello, {}", task.name);
///         Ok(())
///     }
/// }
/// ```
///
/// CPU を長く使う処理は `tokio::task::spawn_blocking` に逃がすこと
/// （worker slot は tokio の task として動く）。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, ctx: JobContext, task: T) -> Result<(), TaskError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T> を DynHandler に変換することで、
/// HashMap<String, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, ctx: JobContext, args: serde_json::Value) -> Result<(), TaskError>;

    /// 作成時の検証用: args が `T` にデコードできるか
    fn validate(&self, args: &serde_json::Value) -> Result<(), ValidationError>;

    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, ctx: JobContext, args: serde_json::Value) -> Result<(), TaskError> {
        let task: T = PayloadCodec::decode_args(args)?;
        self.handler.handle(ctx, task).await
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), ValidationError> {
        PayloadCodec::decode_args::<T>(args.clone()).map(|_| ())
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}

//! Typed - 型付き Task API
//!
//! 任意の関数をシリアライズしてキューに積む代わりに、
//! 名前付きの task kind と handler の閉じた registry を使う。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod codec;
pub mod context;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::PayloadCodec;
pub use self::context::{JobContext, WorkerContext};
pub use self::handler::{DynHandler, Handler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;

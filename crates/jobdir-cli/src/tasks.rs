//! 組み込みの demo task
//!
//! | task kind            | args                 |
//! |----------------------|----------------------|
//! | `demo.hello.v1`      | `{name}`             |
//! | `demo.sleep.v1`      | `{millis}`           |
//! | `demo.fail.v1`       | `{message}`          |
//! | `demo.write_file.v1` | `{path, contents}`   |

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use jobdir_core::{App, AppBuilder, DispatcherConfig, FileJobStore, Handler, JobContext, Task, TaskError};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub name: String,
}

impl Task for Hello {
    const TYPE: &'static str = "demo.hello.v1";
}

pub struct HelloHandler;

#[async_trait]
impl Handler<Hello> for HelloHandler {
    async fn handle(&self, ctx: JobContext, task: Hello) -> Result<(), TaskError> {
        info!(job_id = %ctx.job_id(), worker = ctx.worker_id(), "hello, {}", task.name);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sleep {
    pub millis: u64,
}

impl Task for Sleep {
    const TYPE: &'static str = "demo.sleep.v1";
}

pub struct SleepHandler;

#[async_trait]
impl Handler<Sleep> for SleepHandler {
    async fn handle(&self, _ctx: JobContext, task: Sleep) -> Result<(), TaskError> {
        tokio::time::sleep(Duration::from_millis(task.millis)).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fail {
    pub message: String,
}

impl Task for Fail {
    const TYPE: &'static str = "demo.fail.v1";
}

pub struct FailHandler;

#[async_trait]
impl Handler<Fail> for FailHandler {
    async fn handle(&self, _ctx: JobContext, task: Fail) -> Result<(), TaskError> {
        Err(anyhow::anyhow!(task.message))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFile {
    pub path: PathBuf,
    pub contents: String,
}

impl Task for WriteFile {
    const TYPE: &'static str = "demo.write_file.v1";
}

pub struct WriteFileHandler;

#[async_trait]
impl Handler<WriteFile> for WriteFileHandler {
    async fn handle(&self, ctx: JobContext, task: WriteFile) -> Result<(), TaskError> {
        let path = task.path.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&task.path, task.contents)).await??;
        info!(job_id = %ctx.job_id(), path = %path.display(), "file written");
        Ok(())
    }
}

/// Every built-in task kind.
pub const BUILTIN_TASKS: [&str; 4] = [Hello::TYPE, Sleep::TYPE, Fail::TYPE, WriteFile::TYPE];

/// App with all built-in tasks registered.
pub fn builtin_app(store: FileJobStore, config: DispatcherConfig) -> anyhow::Result<App> {
    let app = AppBuilder::new(store)
        .config(config)
        .register::<Hello, _>(HelloHandler)?
        .register::<Sleep, _>(SleepHandler)?
        .register::<Fail, _>(FailHandler)?
        .register::<WriteFile, _>(WriteFileHandler)?
        .expect_tasks(&BUILTIN_TASKS)
        .build()?;
    Ok(app)
}

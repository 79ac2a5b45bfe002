//! jobdir CLI
//!
//! Entry point for the `jobdir` command-line tool: run the dispatcher with
//! the built-in demo tasks, or act as a producer against a store directory.

mod config;
mod tasks;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jobdir_core::domain::StatusCounts;
use jobdir_core::{FileJobStore, JobId, JobPayload, JobStatus};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "jobdir")]
#[command(about = "Durable job queue in a directory", version)]
struct Cli {
    /// Store root directory (default: `root` from the config file, else ./jobdir)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher until Ctrl-C, then wait for running jobs
    Run {
        /// Number of worker slots
        #[arg(long)]
        pool_size: Option<usize>,

        /// Poll interval when the queue is empty, in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Enqueue a job
    Submit {
        /// Task kind, e.g. demo.hello.v1
        task: String,

        /// Named arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List jobs in creation order
    List {
        /// Only show jobs in this state
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one job
    Info {
        id: JobId,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print a job's error log
    Log { id: JobId },

    /// Put a finished or failed job back in the queue
    Rerun { id: JobId },

    /// Delete a job and its error log
    Delete { id: JobId },

    /// Count jobs per state
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the built-in task kinds
    Tasks,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::from_suffix(s).ok_or_else(|| {
        let known: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown status '{s}', expected one of {}", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobdir=info,jobdir_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let root = config.resolve_root(cli.root);
    let store = FileJobStore::open(&root)
        .with_context(|| format!("opening store at {}", root.display()))?;

    match cli.command {
        Commands::Run {
            pool_size,
            poll_interval_ms,
        } => {
            let mut dispatcher = config.dispatcher;
            if let Some(pool_size) = pool_size {
                dispatcher = dispatcher.with_pool_size(pool_size);
            }
            if let Some(ms) = poll_interval_ms {
                dispatcher = dispatcher.with_poll_interval(Duration::from_millis(ms));
            }
            run(store, dispatcher).await?;
        }
        Commands::Submit { task, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("--args is not valid JSON")?;
            let payload = JobPayload::new(task, args)?;
            let app = tasks::builtin_app(store, config.dispatcher)?;
            let id = app.submit(payload)?;
            println!("{id}");
        }
        Commands::List { status, json } => {
            let mut infos = Vec::new();
            for id in store.list_ids()? {
                match store.get_info(&id) {
                    Ok(info) => infos.push(info),
                    // 一覧の途中で消された
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            infos.retain(|info| status.is_none_or(|s| info.status == s));
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for info in infos {
                    println!("{}  {:<8}  {}", info.job_id, info.status, info.task_name);
                }
            }
        }
        Commands::Info { id, json } => {
            let info = store.get_info(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("id:        {}", info.job_id);
                println!("task:      {}", info.task_name);
                println!("status:    {}", info.status);
                println!("created:   {}", info.created);
                if let Some(started) = info.started {
                    println!("started:   {started}");
                }
                if let Some(completed) = info.completed {
                    println!("completed: {completed}");
                }
                println!("args:      {}", serde_json::Value::Object(info.args));
            }
        }
        Commands::Log { id } => {
            // 存在しない job は空ログではなくエラーにする
            store.status(&id)?;
            print!("{}", store.read_error(&id)?);
        }
        Commands::Rerun { id } => {
            store.rerun(&id)?;
            println!("{id} requeued");
        }
        Commands::Delete { id } => {
            store.delete(&id)?;
            println!("{id} deleted");
        }
        Commands::Status { json } => {
            let counts = store.counts_by_status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                print_counts(&counts);
            }
        }
        Commands::Tasks => {
            for task in tasks::BUILTIN_TASKS {
                println!("{task}");
            }
        }
    }

    Ok(())
}

async fn run(store: FileJobStore, config: jobdir_core::DispatcherConfig) -> anyhow::Result<()> {
    let app = tasks::builtin_app(store, config)?;
    let mut handle = app.start();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("stop requested, waiting for running jobs");
        }
        _ = handle.exited() => {
            warn!("dispatcher exited on its own");
        }
    }

    handle.stop().await?;
    Ok(())
}

fn print_counts(counts: &StatusCounts) {
    println!("creating  {}", counts.creating);
    println!("pending   {}", counts.pending);
    println!("running   {}", counts.running);
    println!("done      {}", counts.done);
    println!("error     {}", counts.error);
    println!("total     {}", counts.total());
}

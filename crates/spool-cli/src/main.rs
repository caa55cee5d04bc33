use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use spool_core::impls::{InMemoryBackend, JsonFileStore};
use spool_core::ports::PayloadStore;
use spool_core::typed::{TaskDescriptor, TaskRegistry};
use spool_core::{
    Payload, SpoolConfig, Task, TaskContext, TaskError, TaskManagerBuilder, TaskOptions,
    TaskResult, TaskType,
};

/// Schedule a greeting task that fails a few times before it succeeds.
#[derive(Debug, Parser)]
#[command(name = "spool", version, about)]
struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Who to greet.
    #[arg(long, default_value = "spool")]
    name: String,

    /// Firings that ask to be rescheduled before the greeting succeeds.
    #[arg(long, default_value_t = 2)]
    failures: u32,

    /// Retry ceiling for the greeting task (0 = none).
    #[arg(long, default_value_t = 5)]
    ceiling: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloPayload {
    name: String,
}

struct HelloTask {
    failures: u32,
}

#[async_trait]
impl Task for HelloTask {
    async fn execute(
        &self,
        ctx: &TaskContext,
        payload: Option<&Payload>,
    ) -> Result<TaskResult, TaskError> {
        let payload = payload.ok_or_else(|| TaskError::new("greeting needs a payload"))?;
        let p: HelloPayload = payload.decode()?;

        let attempt = ctx.retry_count().unwrap_or(1);
        if attempt <= self.failures {
            tracing::info!(attempt, "intentional failure, asking to reschedule");
            return Ok(TaskResult::Reschedule);
        }

        println!("Hello, {}!", p.name);
        ctx.store().put_string("last_greeted", &p.name).await?;
        Ok(TaskResult::Success)
    }

    async fn on_retries_exhausted(&self, ctx: &TaskContext, _payload: Option<&Payload>) {
        tracing::error!(tag = ?ctx.tag(), "greeting gave up");
    }
}

impl TaskType for HelloTask {
    const TYPE: &'static str = "demo.hello.greet.v1";
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SpoolConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SpoolConfig::default(),
    };
    init_tracing(&config.log_filter);

    // (A) store と backend を用意
    let store = JsonFileStore::open(&config.store_path)
        .await
        .with_context(|| format!("opening payload store {}", config.store_path.display()))?;
    let backend = Arc::new(InMemoryBackend::new(config.backoff.clone()));

    // (B) task を登録して TaskManager を構築
    let failures = args.failures;
    let mut registry = TaskRegistry::new();
    let descriptor = TaskDescriptor::of::<HelloTask>()
        .default_options(TaskOptions::builder().retry_ceiling(args.ceiling).build());
    registry.register_with(descriptor, move || {
        Ok(Box::new(HelloTask { failures }) as Box<dyn Task>)
    })?;
    let manager = TaskManagerBuilder::new()
        .registry(registry)
        .store(Arc::new(store))
        .backend(backend.clone())
        .expect_tasks(&[HelloTask::TYPE])
        .build()?;

    // (C) タスク投入
    let payload = Payload::from_serializable(&HelloPayload {
        name: args.name.clone(),
    })?;
    manager.schedule_task::<HelloTask>(Some(payload), None).await;

    // (D) backend を起動し、pending が空になるか Ctrl-C で止める
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn({
        let backend = backend.clone();
        let manager = manager.clone();
        let idle_poll = config.poll_interval();
        async move { backend.run(&manager, idle_poll, shutdown_rx).await }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if backend.pending_tags().await.is_empty() {
                    break;
                }
            }
        }
    }

    shutdown_tx.send(true)?;
    runner.await?;
    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atelier_worker=info,atelier_engine=info,atelier_campaign=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let plan_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: atelier-worker <plan.json>")?;

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(?config, "Loaded worker configuration");

    let worker = Worker::from_config(config)?;

    // --- Shutdown ---
    let executor = worker.executor().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight shots");
            executor.stop();
        }
    });

    let summary = worker
        .run_plan_file(&plan_path)
        .await
        .with_context(|| format!("running plan {}", plan_path.display()))?;

    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Worker finished",
    );

    if !summary.all_succeeded() {
        anyhow::bail!(
            "{} shot(s) failed, {} skipped",
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}

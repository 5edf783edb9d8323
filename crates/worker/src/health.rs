//! Credential pool health watchdog.
//!
//! Periodically reads the pool's health and logs it at a level matching
//! the status. Runs on a fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use atelier_core::credentials::CredentialPool;
use atelier_core::health::{HealthReport, HealthStatus};
use tokio_util::sync::CancellationToken;

/// Answer one health query.
pub fn check(pool: &CredentialPool) -> HealthReport {
    HealthReport::from(pool.health())
}

/// Run the health watchdog loop until `cancel` is triggered.
///
/// The first check happens immediately. Returns the number of checks made.
pub async fn run(pool: Arc<CredentialPool>, every: Duration, cancel: CancellationToken) -> u64 {
    tracing::info!(interval_secs = every.as_secs(), "Health watchdog started");

    let mut interval = tokio::time::interval(every);
    let mut checks = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(checks, "Health watchdog stopping");
                break;
            }
            _ = interval.tick() => {
                checks += 1;
                log_report(&check(&pool));
            }
        }
    }

    checks
}

fn log_report(report: &HealthReport) {
    let message = report.message.as_deref().unwrap_or("");
    match report.status {
        HealthStatus::Ok => tracing::debug!(status = %report.status, "Credential pool healthy"),
        HealthStatus::Warning => {
            tracing::warn!(status = %report.status, message, "Credential pool degraded")
        }
        HealthStatus::Critical => {
            tracing::error!(status = %report.status, message, "Credential pool offline")
        }
    }
}

//! Health query answered to the external watchdog.

use serde::Serialize;

use crate::credentials::{PoolHealth, PoolStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<PoolHealth> for HealthReport {
    fn from(health: PoolHealth) -> Self {
        match health.status {
            PoolStatus::Active => Self {
                status: HealthStatus::Ok,
                message: None,
            },
            PoolStatus::Degraded => Self {
                status: HealthStatus::Warning,
                message: Some(format!(
                    "Only low-cost credentials available ({}); premium requests will fail",
                    health.low_cost_count
                )),
            },
            PoolStatus::Offline => Self {
                status: HealthStatus::Critical,
                message: Some("No credential of any tier is resolvable".to_string()),
            },
        }
    }
}

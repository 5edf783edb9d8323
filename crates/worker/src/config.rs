use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use atelier_campaign::ExecutorOptions;
use atelier_core::generation::{
    ModelCatalog, DEFAULT_FAST_IMAGE_MODEL, DEFAULT_FAST_VIDEO_MODEL,
    DEFAULT_PREMIUM_IMAGE_MODEL, DEFAULT_PREMIUM_VIDEO_MODEL, DEFAULT_TEXT_MODEL,
};
use atelier_engine::api::DEFAULT_BASE_URL;
use atelier_engine::poller::PollConfig;
use atelier_engine::retry::RetryPolicy;
use atelier_engine::EngineConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Worker configuration loaded from environment variables.
///
/// Every field has a default suitable for local development; only the
/// credential variables are needed for a real run.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Backend root URL (default: the public generative language API).
    pub backend_base_url: String,
    /// Managed gateway secret, used when a tier has no pooled credential.
    pub gateway_api_key: Option<String>,
    pub low_cost_api_keys: Vec<String>,
    pub premium_api_keys: Vec<String>,
    /// JSON snapshot of the credential pool, loaded at startup.
    pub credentials_file: Option<PathBuf>,
    pub catalog: ModelCatalog,
    /// Generations in flight during a bulk run (default: `2`).
    pub campaign_concurrency: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    /// Seconds between credential pool health checks (default: `30`).
    pub health_interval_secs: u64,
    /// Directory generated artifacts are written to (default: `./output`).
    pub output_dir: PathBuf,
    pub enhance_prompts: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                     |
    /// |------------------------|---------------------------------------------|
    /// | `BACKEND_BASE_URL`     | `https://generativelanguage.googleapis.com` |
    /// | `GATEWAY_API_KEY`      | unset                                       |
    /// | `LOW_COST_API_KEYS`    | empty, comma separated                      |
    /// | `PREMIUM_API_KEYS`     | empty, comma separated                      |
    /// | `CREDENTIALS_FILE`     | unset                                       |
    /// | `PREMIUM_IMAGE_MODEL`  | `gemini-3-pro-image-preview`                |
    /// | `FAST_IMAGE_MODEL`     | `gemini-2.5-flash-image`                    |
    /// | `PREMIUM_VIDEO_MODEL`  | `veo-3.1-generate-preview`                  |
    /// | `FAST_VIDEO_MODEL`     | `veo-3.1-fast-generate-preview`             |
    /// | `TEXT_MODEL`           | `gemini-2.5-flash`                          |
    /// | `CAMPAIGN_CONCURRENCY` | `2`                                         |
    /// | `RETRY_MAX_ATTEMPTS`   | `3`                                         |
    /// | `RETRY_BASE_DELAY_MS`  | `1000`                                      |
    /// | `POLL_INTERVAL_SECS`   | `5`                                         |
    /// | `POLL_TIMEOUT_SECS`    | `600`                                       |
    /// | `HEALTH_INTERVAL_SECS` | `30`                                        |
    /// | `OUTPUT_DIR`           | `./output`                                  |
    /// | `ENHANCE_PROMPTS`      | `false`                                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |var: &str, default: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let list = |var: &str| -> Vec<String> {
            lookup(var)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let catalog = ModelCatalog {
            premium_image: string("PREMIUM_IMAGE_MODEL", DEFAULT_PREMIUM_IMAGE_MODEL),
            fast_image: string("FAST_IMAGE_MODEL", DEFAULT_FAST_IMAGE_MODEL),
            premium_video: string("PREMIUM_VIDEO_MODEL", DEFAULT_PREMIUM_VIDEO_MODEL),
            fast_video: string("FAST_VIDEO_MODEL", DEFAULT_FAST_VIDEO_MODEL),
            text: string("TEXT_MODEL", DEFAULT_TEXT_MODEL),
        };

        Ok(Self {
            backend_base_url: string("BACKEND_BASE_URL", DEFAULT_BASE_URL),
            gateway_api_key: optional("GATEWAY_API_KEY"),
            low_cost_api_keys: list("LOW_COST_API_KEYS"),
            premium_api_keys: list("PREMIUM_API_KEYS"),
            credentials_file: optional("CREDENTIALS_FILE").map(PathBuf::from),
            catalog,
            campaign_concurrency: parse(&lookup, "CAMPAIGN_CONCURRENCY", 2)?,
            retry_max_attempts: parse(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: parse(&lookup, "RETRY_BASE_DELAY_MS", 1000)?,
            poll_interval_secs: parse(&lookup, "POLL_INTERVAL_SECS", 5)?,
            poll_timeout_secs: parse(&lookup, "POLL_TIMEOUT_SECS", 600)?,
            health_interval_secs: parse(&lookup, "HEALTH_INTERVAL_SECS", 30)?,
            output_dir: PathBuf::from(string("OUTPUT_DIR", "./output")),
            enhance_prompts: parse_flag(&lookup, "ENHANCE_PROMPTS")?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.catalog.clone());
        config.retry = RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        };
        config.poll = PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        };
        config
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            concurrency: self.campaign_concurrency.max(1),
            enhance_prompts: self.enhance_prompts,
        }
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }
}

// Key material stays out of Debug output; only counts are shown.
impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("backend_base_url", &self.backend_base_url)
            .field("has_gateway", &self.gateway_api_key.is_some())
            .field("low_cost_keys", &self.low_cost_api_keys.len())
            .field("premium_keys", &self.premium_api_keys.len())
            .field("credentials_file", &self.credentials_file)
            .field("catalog", &self.catalog)
            .field("campaign_concurrency", &self.campaign_concurrency)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("health_interval_secs", &self.health_interval_secs)
            .field("output_dir", &self.output_dir)
            .field("enhance_prompts", &self.enhance_prompts)
            .finish()
    }
}

// ---- private helpers ----

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var,
                value: raw.clone(),
            })
        }
        _ => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::Invalid { var, value: raw }),
    }
}

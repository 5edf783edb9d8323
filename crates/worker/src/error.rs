use atelier_campaign::{CampaignError, StoreError};
use atelier_core::credentials::CredentialError;
use atelier_engine::BackendError;

use crate::config::ConfigError;

/// Startup and run failures surfaced by the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Credential pool: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Backend client: {0}")]
    Backend(#[from] BackendError),

    #[error("Campaign: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Artifact store: {0}")]
    Store(#[from] StoreError),

    #[error("Plan file {path}: {message}")]
    Plan { path: String, message: String },
}

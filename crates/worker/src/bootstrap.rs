//! Credential pool bootstrap.
//!
//! The pool starts from the persisted snapshot (if configured), then every
//! key from the environment is added to its tier. Keys already present in
//! the snapshot are skipped. Secrets are never logged; a rejected key is
//! reported by its position in the list.

use atelier_core::credentials::{CredentialError, CredentialPool, Tier};

use crate::config::WorkerConfig;
use crate::error::WorkerError;

pub fn build_pool(config: &WorkerConfig) -> Result<CredentialPool, WorkerError> {
    let gateway = config.gateway_api_key.clone();
    let pool = match &config.credentials_file {
        Some(path) => CredentialPool::load(path, gateway)?,
        None => CredentialPool::new(gateway),
    };

    add_keys(&pool, &config.low_cost_api_keys, Tier::LowCost)?;
    add_keys(&pool, &config.premium_api_keys, Tier::Premium)?;

    let health = pool.health();
    tracing::info!(
        low_cost = health.low_cost_count,
        premium = health.premium_count,
        gateway = health.has_gateway,
        "Credential pool ready",
    );
    Ok(pool)
}

// ---- private helpers ----

fn add_keys(pool: &CredentialPool, keys: &[String], tier: Tier) -> Result<(), WorkerError> {
    for (index, key) in keys.iter().enumerate() {
        match pool.add(key, tier, None) {
            Ok(id) => tracing::debug!(credential_id = %id, %tier, "Credential added"),
            Err(CredentialError::DuplicateCredential) => {
                tracing::warn!(%tier, position = index + 1, "Duplicate credential skipped");
            }
            Err(e) => {
                tracing::error!(%tier, position = index + 1, error = %e, "Credential rejected");
                return Err(e.into());
            }
        }
    }
    Ok(())
}

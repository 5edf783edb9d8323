//! Tiered credential pool with gateway fallback.
//!
//! [`CredentialPool`] resolves "a credential for tier T" to a concrete
//! secret without the caller knowing where it came from: a random member
//! of the tier's pool when one exists, otherwise the process-wide gateway
//! secret. Secrets never appear in `Debug` output, listings or errors.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Secrets shorter than this (after trimming) are rejected.
pub const MIN_SECRET_LEN: usize = 20;

/// Number of trailing characters shown in masked listings.
const MASK_VISIBLE_SUFFIX: usize = 4;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Cost/capability class of a credential (and of the request using it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    LowCost,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowCost => "low_cost",
            Self::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A stored backend credential. Owned exclusively by the pool.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: EntityId,
    secret: String,
    pub tier: Tier,
    pub label: String,
    pub added_at: Timestamp,
    #[serde(default)]
    pub error_count: u32,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &mask_secret(&self.secret))
            .field("tier", &self.tier)
            .field("label", &self.label)
            .field("added_at", &self.added_at)
            .field("error_count", &self.error_count)
            .finish()
    }
}

/// Listing view of a credential with the secret masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    pub id: EntityId,
    pub tier: Tier,
    pub label: String,
    pub masked_secret: String,
    pub added_at: Timestamp,
    pub error_count: u32,
}

/// Where a resolved secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// A member of the requested tier's pool.
    Pool(EntityId),
    /// The process-wide gateway secret.
    Gateway,
}

/// A secret handed to a caller for one generation.
#[derive(Clone)]
pub struct ResolvedCredential {
    pub source: CredentialSource,
    pub tier: Tier,
    secret: String,
}

impl ResolvedCredential {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .field("tier", &self.tier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Coarse pool status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    /// Gateway present or at least one premium credential.
    Active,
    /// Only low-cost credentials exist.
    Degraded,
    /// Nothing resolvable.
    Offline,
}

/// Snapshot read by the health watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    pub low_cost_count: usize,
    pub premium_count: usize,
    pub has_gateway: bool,
    pub status: PoolStatus,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential is already in the pool")]
    DuplicateCredential,

    #[error("No credential available for tier {0}")]
    NoCredentialAvailable(Tier),

    #[error("Credential store I/O failed: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolSnapshot {
    credentials: Vec<Credential>,
}

/// In-memory credential pool. Safe to share via `Arc` across workers;
/// every read and write takes the same lock.
pub struct CredentialPool {
    credentials: Mutex<Vec<Credential>>,
    gateway: Option<String>,
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.credentials)
            .field("gateway", &self.gateway.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CredentialPool {
    /// Create an empty pool. A blank gateway secret counts as absent.
    pub fn new(gateway: Option<String>) -> Self {
        let gateway = gateway
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        Self {
            credentials: Mutex::new(Vec::new()),
            gateway,
        }
    }

    /// Load a pool from a JSON snapshot. A missing file yields an empty pool.
    pub fn load(path: &Path, gateway: Option<String>) -> Result<Self, CredentialError> {
        let pool = Self::new(gateway);
        if !path.exists() {
            return Ok(pool);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CredentialError::Storage(format!("read {}: {e}", path.display())))?;
        let snapshot: PoolSnapshot = serde_json::from_str(&raw)
            .map_err(|e| CredentialError::Storage(format!("parse {}: {e}", path.display())))?;
        tracing::debug!(
            count = snapshot.credentials.len(),
            path = %path.display(),
            "Loaded credential snapshot",
        );
        *pool.lock() = snapshot.credentials;
        Ok(pool)
    }

    /// Persist the pool to a JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<(), CredentialError> {
        let snapshot = PoolSnapshot {
            credentials: self.lock().clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| CredentialError::Storage(format!("write {}: {e}", path.display())))
    }

    /// Add a credential to the tier's pool.
    pub fn add(
        &self,
        secret: &str,
        tier: Tier,
        label: Option<&str>,
    ) -> Result<EntityId, CredentialError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CredentialError::InvalidCredential(
                "secret must not be empty".to_string(),
            ));
        }
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CredentialError::InvalidCredential(format!(
                "secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        let mut credentials = self.lock();
        if credentials.iter().any(|c| c.secret == secret) {
            return Err(CredentialError::DuplicateCredential);
        }

        let id = uuid::Uuid::new_v4();
        let label = match label.map(str::trim) {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => format!("{} key {}", tier, credentials.len() + 1),
        };
        credentials.push(Credential {
            id,
            secret: secret.to_string(),
            tier,
            label,
            added_at: Utc::now(),
            error_count: 0,
        });
        tracing::info!(credential_id = %id, %tier, "Credential added");
        Ok(id)
    }

    /// Remove a credential. Removing an unknown id is a no-op.
    pub fn remove(&self, id: EntityId) {
        let mut credentials = self.lock();
        let before = credentials.len();
        credentials.retain(|c| c.id != id);
        if credentials.len() != before {
            tracing::info!(credential_id = %id, "Credential removed");
        }
    }

    /// Resolve a secret for `tier`: a uniformly random pool member, else
    /// the gateway, else [`CredentialError::NoCredentialAvailable`].
    pub fn resolve(&self, tier: Tier) -> Result<ResolvedCredential, CredentialError> {
        let credentials = self.lock();
        let members: Vec<&Credential> = credentials.iter().filter(|c| c.tier == tier).collect();

        if !members.is_empty() {
            let picked = members[rand::rng().random_range(0..members.len())];
            return Ok(ResolvedCredential {
                source: CredentialSource::Pool(picked.id),
                tier,
                secret: picked.secret.clone(),
            });
        }

        match &self.gateway {
            Some(gateway) => Ok(ResolvedCredential {
                source: CredentialSource::Gateway,
                tier,
                secret: gateway.clone(),
            }),
            None => Err(CredentialError::NoCredentialAvailable(tier)),
        }
    }

    /// Pool counts and derived status.
    pub fn health(&self) -> PoolHealth {
        let credentials = self.lock();
        let low_cost_count = credentials.iter().filter(|c| c.tier == Tier::LowCost).count();
        let premium_count = credentials.len() - low_cost_count;
        let has_gateway = self.gateway.is_some();

        let status = if has_gateway || premium_count > 0 {
            PoolStatus::Active
        } else if low_cost_count > 0 {
            PoolStatus::Degraded
        } else {
            PoolStatus::Offline
        };

        PoolHealth {
            low_cost_count,
            premium_count,
            has_gateway,
            status,
        }
    }

    /// Masked listing of every credential.
    pub fn list(&self) -> Vec<CredentialSummary> {
        self.lock()
            .iter()
            .map(|c| CredentialSummary {
                id: c.id,
                tier: c.tier,
                label: c.label.clone(),
                masked_secret: mask_secret(&c.secret),
                added_at: c.added_at,
                error_count: c.error_count,
            })
            .collect()
    }

    /// Every secret the pool knows about, gateway included. Used to build
    /// the error-message redactor; never log the return value.
    pub fn known_secrets(&self) -> Vec<String> {
        let mut secrets: Vec<String> = self.lock().iter().map(|c| c.secret.clone()).collect();
        if let Some(gateway) = &self.gateway {
            secrets.push(gateway.clone());
        }
        secrets
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Credential>> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mask all but the last few characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= MASK_VISIBLE_SUFFIX * 2 {
        return "••••".to_string();
    }
    let suffix: String = chars[chars.len() - MASK_VISIBLE_SUFFIX..].iter().collect();
    format!("••••{suffix}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

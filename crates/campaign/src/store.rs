//! Artifact persistence.
//!
//! The executor hands every successful result to an [`ArtifactStore`] and
//! records the returned id on the shot. [`FsArtifactStore`] writes files
//! and embeds the generation settings into PNGs so a file dropped back in
//! restores its configuration; [`MemoryArtifactStore`] keeps bytes in
//! memory for tests and dry runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use atelier_core::generation::{GenerationRequest, GenerationResult};
use atelier_core::settings_codec::{embed_settings, is_png};
use atelier_core::types::{EntityId, ShotId, Timestamp};
use chrono::Utc;
use serde::Serialize;

use crate::error::StoreError;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub id: EntityId,
    pub shot_id: ShotId,
    /// File path or `memory://` locator.
    pub location: String,
    pub mime_type: String,
    pub model: String,
    pub tags: Vec<String>,
    pub stored_at: Timestamp,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(
        &self,
        shot_id: &str,
        request: &GenerationRequest,
        result: &GenerationResult,
    ) -> Result<StoredArtifact, StoreError>;
}

/// Settings document embedded into stored PNGs: the request settings plus
/// what actually produced the artifact.
pub fn artifact_settings(request: &GenerationRequest, result: &GenerationResult) -> serde_json::Value {
    let mut settings = request.settings_json();
    settings["result"] = serde_json::json!({
        "model": result.model_actually_used,
        "tier": result.tier_actually_used.as_str(),
        "tags": result.tags,
        "sessionId": result.session_id,
    });
    settings
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// Keep shot ids usable as file-name fragments.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        shot_id: &str,
        request: &GenerationRequest,
        result: &GenerationResult,
    ) -> Result<StoredArtifact, StoreError> {
        if result.artifact_bytes.is_empty() {
            return Err(StoreError::Empty);
        }

        let id = uuid::Uuid::new_v4();
        let file_name = format!(
            "{}-{id}.{}",
            sanitize(shot_id),
            extension_for(&result.mime_type)
        );
        let path = self.root.join(file_name);

        let bytes = if is_png(&result.artifact_bytes) {
            embed_settings(&result.artifact_bytes, &artifact_settings(request, result))
        } else {
            result.artifact_bytes.clone()
        };

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            shot_id,
            artifact_id = %id,
            path = %path.display(),
            bytes = bytes.len(),
            "Artifact stored",
        );

        Ok(StoredArtifact {
            id,
            shot_id: shot_id.to_string(),
            location: path.display().to_string(),
            mime_type: result.mime_type.clone(),
            model: result.model_actually_used.clone(),
            tags: result.tags.clone(),
            stored_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<EntityId, (StoredArtifact, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntityId) -> Option<(StoredArtifact, Vec<u8>)> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, (StoredArtifact, Vec<u8>)>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        shot_id: &str,
        _request: &GenerationRequest,
        result: &GenerationResult,
    ) -> Result<StoredArtifact, StoreError> {
        if result.artifact_bytes.is_empty() {
            return Err(StoreError::Empty);
        }
        let id = uuid::Uuid::new_v4();
        let artifact = StoredArtifact {
            id,
            shot_id: shot_id.to_string(),
            location: format!("memory://{id}"),
            mime_type: result.mime_type.clone(),
            model: result.model_actually_used.clone(),
            tags: result.tags.clone(),
            stored_at: Utc::now(),
        };
        self.lock()
            .insert(id, (artifact.clone(), result.artifact_bytes.clone()));
        Ok(artifact)
    }
}

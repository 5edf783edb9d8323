//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use atelier_core::settings_codec::{encode_chunk, PNG_SIGNATURE};
use atelier_engine::backend::{
    BackendResponse, FetchedArtifact, GenerationBackend, GenerationCall, JobStatus,
    OperationHandle,
};
use atelier_engine::BackendError;
use atelier_worker::WorkerConfig;

pub const PREMIUM_SECRET: &str = "premium-secret-0123456789abcdef";
pub const LOW_COST_SECRET: &str = "lowcost-secret-0123456789abcdef";

/// Answers every image call with a small valid PNG.
#[derive(Default)]
pub struct PngBackend {
    calls: AtomicUsize,
}

impl PngBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for PngBackend {
    async fn generate(
        &self,
        _credential: &str,
        _call: &GenerationCall,
    ) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BackendResponse::Artifact {
            mime: "image/png".to_string(),
            bytes: png(),
            response_id: Some("resp-1".to_string()),
        })
    }

    async fn submit_job(
        &self,
        _credential: &str,
        _call: &GenerationCall,
    ) -> Result<OperationHandle, BackendError> {
        Err(BackendError::http(400, "video not supported"))
    }

    async fn job_status(
        &self,
        _credential: &str,
        _handle: &OperationHandle,
    ) -> Result<JobStatus, BackendError> {
        Err(BackendError::http(400, "video not supported"))
    }

    async fn fetch_artifact(
        &self,
        _credential: &str,
        _uri: &str,
    ) -> Result<FetchedArtifact, BackendError> {
        Err(BackendError::http(400, "video not supported"))
    }

    async fn complete_text(
        &self,
        _credential: &str,
        _model: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        Ok(prompt.to_string())
    }
}

pub fn png() -> Vec<u8> {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend(encode_chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]));
    png.extend(encode_chunk(b"IEND", &[]));
    png
}

/// Configuration from an explicit variable set, writing into `output_dir`.
pub fn config(output_dir: &Path, vars: &[(&str, &str)]) -> WorkerConfig {
    let mut vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.insert(
        "OUTPUT_DIR".to_string(),
        output_dir.to_string_lossy().into_owned(),
    );
    WorkerConfig::from_lookup(|var| vars.get(var).cloned()).unwrap()
}

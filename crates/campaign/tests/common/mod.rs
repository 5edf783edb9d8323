//! Shared fixtures for campaign integration tests.
//!
//! [`KeyedBackend`] answers image generation calls by looking for a
//! registered key inside the prompt, so each shot can be scripted
//! independently of scheduling order. It also tracks how many calls are in
//! flight at once.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier_campaign::request_builder::TemplateRequestBuilder;
use atelier_campaign::store::MemoryArtifactStore;
use atelier_campaign::{CampaignBrief, CampaignExecutor, CampaignPlan, ExecutorOptions, Shot};
use atelier_core::credentials::{CredentialPool, Tier};
use atelier_core::generation::ModelCatalog;
use atelier_engine::backend::{
    BackendResponse, FetchedArtifact, FinishReason, GenerationBackend, GenerationCall, JobStatus,
    OperationHandle,
};
use atelier_engine::retry::RetryPolicy;
use atelier_engine::{BackendError, EngineConfig, ExecutionEngine};

pub const PREMIUM_SECRET: &str = "premium-secret-0123456789abcdef";

/// Simulated latency of every generate call.
pub const CALL_LATENCY: Duration = Duration::from_millis(100);

type Script = VecDeque<Result<BackendResponse, BackendError>>;

#[derive(Default)]
pub struct KeyedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    prompts: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl KeyedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for calls whose prompt contains `key`. Keys with
    /// nothing queued answer with a PNG.
    pub fn script(&self, key: &str, response: Result<BackendResponse, BackendError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(model, prompt)` of every generate call, in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_for(&self, prompt: &str) -> Result<BackendResponse, BackendError> {
        let mut scripts = self.scripts.lock().unwrap();
        let scripted = scripts
            .iter_mut()
            .find(|(key, queue)| prompt.contains(key.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(png()))
    }
}

#[async_trait]
impl GenerationBackend for KeyedBackend {
    async fn generate(
        &self,
        _credential: &str,
        call: &GenerationCall,
    ) -> Result<BackendResponse, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let prompt = call.prompt_text();
        self.prompts
            .lock()
            .unwrap()
            .push((call.model.clone(), prompt.clone()));
        tokio::time::sleep(CALL_LATENCY).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next_for(&prompt)
    }

    async fn submit_job(
        &self,
        _credential: &str,
        _call: &GenerationCall,
    ) -> Result<OperationHandle, BackendError> {
        Err(BackendError::http(400, "video not scripted"))
    }

    async fn job_status(
        &self,
        _credential: &str,
        _handle: &OperationHandle,
    ) -> Result<JobStatus, BackendError> {
        Err(BackendError::http(400, "video not scripted"))
    }

    async fn fetch_artifact(
        &self,
        _credential: &str,
        _uri: &str,
    ) -> Result<FetchedArtifact, BackendError> {
        Err(BackendError::http(400, "video not scripted"))
    }

    async fn complete_text(
        &self,
        _credential: &str,
        _model: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        Ok(format!("{prompt} (enhanced)"))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn png() -> BackendResponse {
    BackendResponse::Artifact {
        mime: "image/png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        response_id: None,
    }
}

pub fn policy_block() -> BackendResponse {
    BackendResponse::Blocked {
        reason: FinishReason::ImageSafety,
        detail: None,
    }
}

pub fn bad_request() -> BackendError {
    BackendError::http(400, "invalid argument")
}

pub fn plan(shots: &[(&str, &str)]) -> CampaignPlan {
    CampaignPlan::new(
        CampaignBrief::new("Autumn drop", "a leather satchel"),
        shots
            .iter()
            .map(|(id, description)| Shot::new(*id, *description, "natural light"))
            .collect(),
    )
}

pub struct Harness {
    pub backend: Arc<KeyedBackend>,
    pub store: Arc<MemoryArtifactStore>,
    pub executor: CampaignExecutor,
}

pub fn harness(options: ExecutorOptions) -> Harness {
    let backend = KeyedBackend::new();
    let pool = CredentialPool::new(None);
    pool.add(PREMIUM_SECRET, Tier::Premium, None).unwrap();

    let mut config = EngineConfig::new(ModelCatalog::default());
    config.retry = RetryPolicy::default().without_jitter();
    let engine = Arc::new(ExecutionEngine::new(
        backend.clone(),
        Arc::new(pool),
        config,
    ));

    let store = Arc::new(MemoryArtifactStore::new());
    let executor = CampaignExecutor::new(
        engine,
        Arc::new(TemplateRequestBuilder::new(ModelCatalog::default())),
        store.clone(),
        options,
    );

    Harness {
        backend,
        store,
        executor,
    }
}

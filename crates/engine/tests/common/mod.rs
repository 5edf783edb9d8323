//! Shared fixtures for engine integration tests.
//!
//! [`ScriptedBackend`] replays queued responses per backend method and
//! records every call it receives, so tests can assert on exactly what the
//! engine sent (model, resolution, credential) and how often.
//! [`LogCapture`] collects formatted tracing output for log assertions.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atelier_core::credentials::{CredentialPool, Tier};
use atelier_core::generation::{ModelCatalog, Resolution};
use atelier_engine::backend::{
    BackendResponse, FetchedArtifact, FinishReason, GenerationBackend, GenerationCall, JobStatus,
    OperationHandle,
};
use atelier_engine::retry::RetryPolicy;
use atelier_engine::{BackendError, EngineConfig, ExecutionEngine};

pub const PREMIUM_SECRET: &str = "premium-secret-0123456789abcdef";
pub const LOW_COST_SECRET: &str = "lowcost-secret-0123456789abcdef";

/// One call observed by the scripted backend.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub credential: String,
    pub model: Option<String>,
    pub resolution: Option<Resolution>,
    pub call: Option<GenerationCall>,
}

type Queue<T> = Mutex<VecDeque<Result<T, BackendError>>>;

#[derive(Default)]
pub struct ScriptedBackend {
    generate: Queue<BackendResponse>,
    submit: Queue<OperationHandle>,
    status: Queue<JobStatus>,
    fetch: Queue<FetchedArtifact>,
    text: Queue<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_generate(&self, response: Result<BackendResponse, BackendError>) {
        self.generate.lock().unwrap().push_back(response);
    }

    pub fn push_submit(&self, response: Result<OperationHandle, BackendError>) {
        self.submit.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, response: Result<JobStatus, BackendError>) {
        self.status.lock().unwrap().push_back(response);
    }

    pub fn push_fetch(&self, response: Result<FetchedArtifact, BackendError>) {
        self.fetch.lock().unwrap().push_back(response);
    }

    pub fn push_text(&self, response: Result<String, BackendError>) {
        self.text.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    fn record(&self, method: &'static str, credential: &str, call: Option<&GenerationCall>) {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            credential: credential.to_string(),
            model: call.map(|c| c.model.clone()),
            resolution: call.and_then(|c| {
                c.image_config
                    .map(|i| i.resolution)
                    .or_else(|| c.video_config.as_ref().map(|v| v.resolution))
            }),
            call: call.cloned(),
        });
    }

    fn pop<T>(queue: &Queue<T>, method: &str) -> Result<T, BackendError> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::transport(format!("no scripted {method}"))))
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<BackendResponse, BackendError> {
        self.record("generate", credential, Some(call));
        Self::pop(&self.generate, "generate")
    }

    async fn submit_job(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<OperationHandle, BackendError> {
        self.record("submit_job", credential, Some(call));
        Self::pop(&self.submit, "submit_job")
    }

    async fn job_status(
        &self,
        credential: &str,
        _handle: &OperationHandle,
    ) -> Result<JobStatus, BackendError> {
        self.record("job_status", credential, None);
        Self::pop(&self.status, "job_status")
    }

    async fn fetch_artifact(
        &self,
        credential: &str,
        _uri: &str,
    ) -> Result<FetchedArtifact, BackendError> {
        self.record("fetch_artifact", credential, None);
        Self::pop(&self.fetch, "fetch_artifact")
    }

    async fn complete_text(
        &self,
        credential: &str,
        _model: &str,
        _prompt: &str,
    ) -> Result<String, BackendError> {
        self.record("complete_text", credential, None);
        Self::pop(&self.text, "complete_text")
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Pool with one premium and one low-cost credential, no gateway.
pub fn test_pool() -> Arc<CredentialPool> {
    let pool = CredentialPool::new(None);
    pool.add(PREMIUM_SECRET, Tier::Premium, None).unwrap();
    pool.add(LOW_COST_SECRET, Tier::LowCost, None).unwrap();
    Arc::new(pool)
}

/// Default engine configuration with jitter disabled so paused-clock
/// tests can assert exact elapsed time.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::new(ModelCatalog::default());
    config.retry = RetryPolicy::default().without_jitter();
    config.auxiliary_retry = RetryPolicy::auxiliary().without_jitter();
    config
}

pub fn test_engine(backend: Arc<ScriptedBackend>) -> ExecutionEngine {
    ExecutionEngine::new(backend, test_pool(), test_config())
}

pub fn png_artifact() -> BackendResponse {
    BackendResponse::Artifact {
        mime: "image/png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
        response_id: Some("resp-1".to_string()),
    }
}

pub fn blocked(reason: FinishReason) -> BackendResponse {
    BackendResponse::Blocked {
        reason,
        detail: None,
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// In-memory sink for everything logged on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's tracing events (every level) into the capture
    /// until the returned guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

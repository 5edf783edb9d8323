//! The execution engine.
//!
//! [`ExecutionEngine`] is stateless between calls: it owns shared handles
//! to the backend and the credential pool plus immutable configuration,
//! and every [`generate`](ExecutionEngine::generate) call runs the full
//! resolve -> call -> classify -> retry/fallback pipeline.

use std::sync::Arc;

use atelier_core::credentials::{CredentialPool, ResolvedCredential, Tier};
use atelier_core::generation::{
    to_data_uri, Capability, GenerationRequest, GenerationResult, ModelCatalog, Resolution,
    TAG_FALLBACK,
};
use atelier_core::redaction::Redactor;

use crate::backend::{BackendResponse, GenerationBackend, GenerationCall};
use crate::classify::{blocked_error, classify_backend_error, refusal_excerpt};
use crate::error::EngineError;
use crate::poller::{JobPoller, PollConfig};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Instruction prepended to prompts sent for best-effort enhancement.
const ENHANCE_INSTRUCTION: &str = "Rewrite the following image-generation prompt to be more \
     vivid and specific. Keep every subject, constraint and reference intact. Reply with the \
     rewritten prompt only.";

/// Engine tuning. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Budget for generation, submission and status calls.
    pub retry: RetryPolicy,
    /// Budget for best-effort auxiliary calls.
    pub auxiliary_retry: RetryPolicy,
    pub poll: PollConfig,
    pub catalog: ModelCatalog,
}

impl EngineConfig {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self {
            retry: RetryPolicy::default(),
            auxiliary_retry: RetryPolicy::auxiliary(),
            poll: PollConfig::default(),
            catalog,
        }
    }
}

/// Which model in the one-step cascade is being tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Fallback,
}

pub struct ExecutionEngine {
    backend: Arc<dyn GenerationBackend>,
    pool: Arc<CredentialPool>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        pool: Arc<CredentialPool>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            config,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.config.catalog
    }

    /// Convert one request into one committed artifact.
    ///
    /// Every error returned here has had credential-shaped substrings
    /// replaced with the redaction marker.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, EngineError> {
        let redactor = Redactor::new(self.pool.known_secrets());

        let outcome = match request.capability {
            Capability::Image => self.generate_image(request, &redactor).await,
            Capability::Video => self.generate_video(request, &redactor).await,
        };

        outcome.map_err(|e| {
            let e = e.redact(&redactor);
            tracing::warn!(
                capability = %request.capability,
                model = %request.model,
                tier = %request.tier,
                error = %e,
                "Generation failed",
            );
            e
        })
    }

    /// Best-effort prompt enhancement. Never fails: any problem logs a
    /// warning and hands back the original prompt.
    pub async fn enhance_prompt(&self, prompt: &str, tier: Tier) -> String {
        let credential = match self.resolve(tier) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Prompt enhancement skipped");
                return prompt.to_string();
            }
        };

        let redactor = Redactor::new(self.pool.known_secrets());
        let instruction = format!("{ENHANCE_INSTRUCTION}\n\n{prompt}");
        let secret = credential.secret();
        let model = self.config.catalog.text.as_str();
        let instruction = instruction.as_str();

        let enhanced = retry_with_backoff(
            &self.config.auxiliary_retry,
            &redactor,
            "enhance_prompt",
            |_| async move {
                self.backend
                    .complete_text(secret, model, instruction)
                    .await
                    .map_err(classify_backend_error)
            },
        )
        .await;

        match enhanced {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Prompt enhancement returned nothing, keeping original");
                prompt.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prompt enhancement failed, keeping original");
                prompt.to_string()
            }
        }
    }

    // ---- private helpers ----

    fn resolve(&self, tier: Tier) -> Result<ResolvedCredential, EngineError> {
        self.pool
            .resolve(tier)
            .map_err(|e| EngineError::AuthenticationFailed(e.to_string()))
    }

    async fn generate_image(
        &self,
        request: &GenerationRequest,
        redactor: &Redactor,
    ) -> Result<GenerationResult, EngineError> {
        let credential = self.resolve(request.tier)?;
        let secret = credential.secret();

        let mut stage = Stage::Primary;
        let mut model = request.model.clone();
        let mut resolution = request.resolution;

        loop {
            let call = GenerationCall::build(request, &model, resolution)?;
            let call = &call;

            let response = retry_with_backoff(&self.config.retry, redactor, "generate", |attempt| {
                async move {
                    tracing::debug!(model = %call.model, attempt, "Issuing generation call");
                    self.backend
                        .generate(secret, call)
                        .await
                        .map_err(classify_backend_error)
                }
            })
            .await?;

            match response {
                BackendResponse::Artifact {
                    mime,
                    bytes,
                    response_id,
                } => {
                    let mut tags = vec![Capability::Image.as_str().to_string()];
                    if stage == Stage::Fallback {
                        tags.push(TAG_FALLBACK.to_string());
                    }
                    tracing::info!(
                        model = %model,
                        fallback = stage == Stage::Fallback,
                        bytes = bytes.len(),
                        "Image generated",
                    );
                    return Ok(GenerationResult {
                        artifact_uri: to_data_uri(&mime, &bytes),
                        artifact_bytes: bytes,
                        mime_type: mime,
                        model_actually_used: model,
                        tier_actually_used: credential.tier,
                        tags,
                        session_id: response_id,
                    });
                }
                BackendResponse::Blocked { reason, detail } => {
                    let fallback = match stage {
                        Stage::Primary => self.config.catalog.fallback_for(&model),
                        Stage::Fallback => None,
                    };
                    let Some(fast) = fallback else {
                        return Err(blocked_error(&model, reason, detail.as_deref()));
                    };
                    tracing::warn!(
                        from = %model,
                        to = %fast,
                        %reason,
                        "Output withheld on premium model, substituting fallback",
                    );
                    model = fast.to_string();
                    resolution = Resolution::Standard;
                    stage = Stage::Fallback;
                }
                BackendResponse::Refusal { text } => {
                    return Err(EngineError::ModelRefused(refusal_excerpt(&text)));
                }
            }
        }
    }

    async fn generate_video(
        &self,
        request: &GenerationRequest,
        redactor: &Redactor,
    ) -> Result<GenerationResult, EngineError> {
        let credential = self.resolve(request.tier)?;
        let call = GenerationCall::build(request, &request.model, request.resolution)?;

        let poller = JobPoller::new(
            self.backend.as_ref(),
            &self.config.retry,
            &self.config.poll,
            redactor,
        );
        let job = poller.run(credential.secret(), &call).await?;

        Ok(GenerationResult {
            artifact_bytes: job.artifact.bytes,
            mime_type: job.artifact.mime,
            artifact_uri: job.result_uri,
            model_actually_used: request.model.clone(),
            tier_actually_used: credential.tier,
            tags: vec![Capability::Video.as_str().to_string()],
            session_id: Some(job.operation.0),
        })
    }
}

//! Long-running (video-class) job polling.
//!
//! Submit the job, poll its operation handle at a fixed interval until it
//! reports completion, then download the artifact with the same
//! credential. Submission and status polls go through the retry policy;
//! the final download does not.

use std::time::Duration;

use atelier_core::redaction::Redactor;

use crate::backend::{FetchedArtifact, GenerationBackend, GenerationCall, OperationHandle};
use crate::classify::{classify_backend_error, classify_fetch_error};
use crate::error::EngineError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Polling cadence and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Give up once this much time has passed since submission.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// A finished long-running job and its downloaded artifact.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub operation: OperationHandle,
    pub result_uri: String,
    pub artifact: FetchedArtifact,
    pub polls: u32,
}

/// Drives one long-running job to completion.
pub struct JobPoller<'a> {
    backend: &'a dyn GenerationBackend,
    retry: &'a RetryPolicy,
    config: &'a PollConfig,
    redactor: &'a Redactor,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        backend: &'a dyn GenerationBackend,
        retry: &'a RetryPolicy,
        config: &'a PollConfig,
        redactor: &'a Redactor,
    ) -> Self {
        Self {
            backend,
            retry,
            config,
            redactor,
        }
    }

    pub async fn run(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<CompletedJob, EngineError> {
        let operation =
            retry_with_backoff(self.retry, self.redactor, "submit_job", |_| async move {
                self.backend
                    .submit_job(credential, call)
                    .await
                    .map_err(classify_backend_error)
            })
            .await?;

        tracing::info!(
            model = %call.model,
            operation = %operation,
            "Long-running job submitted",
        );

        let handle = &operation;
        let started = tokio::time::Instant::now();
        let mut polls = 0u32;
        let status = loop {
            tokio::time::sleep(self.config.interval).await;
            polls += 1;

            let status =
                retry_with_backoff(self.retry, self.redactor, "job_status", |_| async move {
                    self.backend
                        .job_status(credential, handle)
                        .await
                        .map_err(classify_backend_error)
                })
                .await?;

            if status.done {
                break status;
            }
            if started.elapsed() >= self.config.timeout {
                return Err(EngineError::JobFailed(format!(
                    "timed out after {}s waiting for {operation}",
                    self.config.timeout.as_secs()
                )));
            }
            tracing::debug!(operation = %operation, polls, "Job still running");
        };

        if let Some(error) = status.error {
            return Err(EngineError::JobFailed(error));
        }
        let result_uri = status.result_uri.ok_or_else(|| {
            EngineError::JobFailed(format!("{operation} completed without a result location"))
        })?;

        let artifact = self
            .backend
            .fetch_artifact(credential, &result_uri)
            .await
            .map_err(classify_fetch_error)?;

        tracing::info!(
            operation = %operation,
            polls,
            bytes = artifact.bytes.len(),
            "Long-running job artifact fetched",
        );

        Ok(CompletedJob {
            operation,
            result_uri,
            artifact,
            polls,
        })
    }
}

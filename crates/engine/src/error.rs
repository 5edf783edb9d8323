//! Engine error taxonomy.

use atelier_core::redaction::Redactor;

/// Sub-kind of an artifact download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// 401/403/404/410: the link is not ours to read, or it expired.
    AccessDenied,
    /// Any other non-success status or transport failure.
    Other,
}

impl std::fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => f.write_str("access denied or expired"),
            Self::Other => f.write_str("transport"),
        }
    }
}

/// Classified failure surfaced by the execution engine.
///
/// Only [`RateLimited`](Self::RateLimited) and
/// [`BackendUnavailable`](Self::BackendUnavailable) are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Content policy blocked output from {model}: {reason}")]
    ContentPolicyBlocked { model: String, reason: String },

    #[error("Generation failed on {model}: {reason}")]
    GenerationFailedOther { model: String, reason: String },

    #[error("Model refused: {0}")]
    ModelRefused(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Artifact fetch failed ({kind}): {message}")]
    ArtifactFetchFailed {
        kind: FetchFailureKind,
        message: String,
    },
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::BackendUnavailable(_))
    }

    /// Scrub every message field through `redactor`.
    pub fn redact(self, redactor: &Redactor) -> Self {
        let r = |s: String| redactor.redact(&s);
        match self {
            Self::AuthenticationFailed(m) => Self::AuthenticationFailed(r(m)),
            Self::RateLimited(m) => Self::RateLimited(r(m)),
            Self::BackendUnavailable(m) => Self::BackendUnavailable(r(m)),
            Self::ContentPolicyBlocked { model, reason } => Self::ContentPolicyBlocked {
                model,
                reason: r(reason),
            },
            Self::GenerationFailedOther { model, reason } => Self::GenerationFailedOther {
                model,
                reason: r(reason),
            },
            Self::ModelRefused(m) => Self::ModelRefused(r(m)),
            Self::InvalidRequest(m) => Self::InvalidRequest(r(m)),
            Self::JobFailed(m) => Self::JobFailed(r(m)),
            Self::ArtifactFetchFailed { kind, message } => Self::ArtifactFetchFailed {
                kind,
                message: r(message),
            },
        }
    }
}

/// Raw transport-level failure reported by a backend implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// HTTP status, when the failure came with one.
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BackendError {}

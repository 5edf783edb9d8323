//! Failure classification at the engine boundary.

use crate::backend::FinishReason;
use crate::error::{BackendError, EngineError, FetchFailureKind};

/// Longest refusal explanation carried in [`EngineError::ModelRefused`].
pub const MAX_REFUSAL_EXCERPT: usize = 200;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "rate-limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
];

const UNAVAILABLE_MARKERS: &[&str] = &[
    "overloaded",
    "unavailable",
    "timeout",
    "timed out",
    "deadline exceeded",
];

/// Classify a transport failure into the engine taxonomy.
///
/// 429 or a quota-style message is [`EngineError::RateLimited`]; 5xx or an
/// overload/timeout message is [`EngineError::BackendUnavailable`]; both are
/// retryable. 401/403 reject the credential. Everything else is a
/// non-retryable [`EngineError::InvalidRequest`].
pub fn classify_backend_error(err: BackendError) -> EngineError {
    let lower = err.message.to_lowercase();
    let matches_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
    let message = err.to_string();

    match err.status {
        Some(429) => EngineError::RateLimited(message),
        _ if matches_any(RATE_LIMIT_MARKERS) => EngineError::RateLimited(message),
        Some(500..=599) => EngineError::BackendUnavailable(message),
        _ if matches_any(UNAVAILABLE_MARKERS) => EngineError::BackendUnavailable(message),
        Some(401) | Some(403) => EngineError::AuthenticationFailed(message),
        _ => EngineError::InvalidRequest(message),
    }
}

/// Classify an artifact download failure.
pub fn classify_fetch_error(err: BackendError) -> EngineError {
    let kind = match err.status {
        Some(401 | 403 | 404 | 410) => FetchFailureKind::AccessDenied,
        _ => FetchFailureKind::Other,
    };
    EngineError::ArtifactFetchFailed {
        kind,
        message: err.to_string(),
    }
}

/// Terminal error for a withheld artifact once no fallback remains.
pub fn blocked_error(model: &str, reason: FinishReason, detail: Option<&str>) -> EngineError {
    let text = match detail {
        Some(d) if !d.is_empty() => format!("{reason} ({d})"),
        _ => reason.to_string(),
    };
    if reason.is_policy() {
        EngineError::ContentPolicyBlocked {
            model: model.to_string(),
            reason: text,
        }
    } else {
        EngineError::GenerationFailedOther {
            model: model.to_string(),
            reason: text,
        }
    }
}

/// Truncate a refusal explanation to [`MAX_REFUSAL_EXCERPT`] characters.
pub fn refusal_excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_REFUSAL_EXCERPT {
        return trimmed.to_string();
    }
    let mut excerpt: String = trimmed.chars().take(MAX_REFUSAL_EXCERPT).collect();
    excerpt.push('…');
    excerpt
}

//! Integration tests for the long-running (video) job path and the
//! best-effort prompt enhancement call.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use atelier_core::credentials::Tier;
use atelier_core::generation::{Capability, GenerationRequest, DEFAULT_PREMIUM_VIDEO_MODEL};
use atelier_engine::backend::{FetchedArtifact, JobStatus, OperationHandle};
use atelier_engine::error::FetchFailureKind;
use atelier_engine::{BackendError, EngineError, ExecutionEngine};

use common::{test_config, test_engine, test_pool, ScriptedBackend, PREMIUM_SECRET};

const RESULT_URI: &str = "https://files.example/video-1";

fn video_request() -> GenerationRequest {
    GenerationRequest::new(
        Capability::Video,
        Tier::Premium,
        DEFAULT_PREMIUM_VIDEO_MODEL,
        "waves rolling onto a beach",
    )
}

fn running() -> JobStatus {
    JobStatus::default()
}

fn finished() -> JobStatus {
    JobStatus {
        done: true,
        error: None,
        result_uri: Some(RESULT_URI.to_string()),
    }
}

fn mp4() -> FetchedArtifact {
    FetchedArtifact {
        mime: "video/mp4".into(),
        bytes: vec![0, 0, 0, 0x18, b'f', b't', b'y', b'p'],
    }
}

// ---------------------------------------------------------------------------
// Test: submit, poll until done, fetch with the same credential
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn job_is_polled_until_done_then_fetched() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-1".into())));
    backend.push_status(Ok(running()));
    backend.push_status(Ok(running()));
    backend.push_status(Ok(finished()));
    backend.push_fetch(Ok(mp4()));
    let engine = test_engine(backend.clone());

    let started = tokio::time::Instant::now();
    let result = engine.generate(&video_request()).await.unwrap();

    assert_eq!(result.artifact_uri, RESULT_URI);
    assert_eq!(result.mime_type, "video/mp4");
    assert_eq!(result.artifact_bytes, mp4().bytes);
    assert_eq!(result.session_id.as_deref(), Some("operations/op-1"));
    assert!(!result.is_fallback());

    assert_eq!(backend.calls_to("job_status").len(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert!(backend
        .calls()
        .iter()
        .all(|c| c.credential == PREMIUM_SECRET));
}

// ---------------------------------------------------------------------------
// Test: a finished job carrying an error fails as JobFailed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn job_error_is_job_failed() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-2".into())));
    backend.push_status(Ok(JobStatus {
        done: true,
        error: Some("prompt rejected by safety filter".into()),
        result_uri: None,
    }));
    let engine = test_engine(backend.clone());

    let err = engine.generate(&video_request()).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::JobFailed("prompt rejected by safety filter".into())
    );
    assert!(backend.calls_to("fetch_artifact").is_empty());
}

// ---------------------------------------------------------------------------
// Test: expired result links are a distinct fetch failure sub-kind
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn expired_link_is_access_denied() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-3".into())));
    backend.push_status(Ok(finished()));
    backend.push_fetch(Err(BackendError::http(403, "signature expired")));
    let engine = test_engine(backend.clone());

    let err = engine.generate(&video_request()).await.unwrap_err();

    assert_matches!(
        err,
        EngineError::ArtifactFetchFailed {
            kind: FetchFailureKind::AccessDenied,
            ..
        }
    );
    assert_eq!(backend.calls_to("fetch_artifact").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_fetch_failure_is_transport_kind() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-4".into())));
    backend.push_status(Ok(finished()));
    backend.push_fetch(Err(BackendError::http(502, "bad gateway")));
    let engine = test_engine(backend.clone());

    let err = engine.generate(&video_request()).await.unwrap_err();

    assert_matches!(
        err,
        EngineError::ArtifactFetchFailed {
            kind: FetchFailureKind::Other,
            ..
        }
    );
}

// ---------------------------------------------------------------------------
// Test: transient status-poll failures are retried
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn status_poll_retries_transient_errors() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-5".into())));
    backend.push_status(Err(BackendError::http(503, "unavailable")));
    backend.push_status(Ok(finished()));
    backend.push_fetch(Ok(mp4()));
    let engine = test_engine(backend.clone());

    engine.generate(&video_request()).await.unwrap();

    assert_eq!(backend.calls_to("job_status").len(), 2);
}

// ---------------------------------------------------------------------------
// Test: a job that never finishes times out as JobFailed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn never_finishing_job_times_out() {
    let backend = ScriptedBackend::new();
    backend.push_submit(Ok(OperationHandle("operations/op-6".into())));
    for _ in 0..10 {
        backend.push_status(Ok(running()));
    }
    let mut config = test_config();
    config.poll.timeout = Duration::from_secs(20);
    let engine = ExecutionEngine::new(backend.clone(), test_pool(), config);

    let err = engine.generate(&video_request()).await.unwrap_err();

    assert_matches!(err, EngineError::JobFailed(ref m) if m.contains("timed out"));
    assert_eq!(backend.calls_to("job_status").len(), 4);
}

// ---------------------------------------------------------------------------
// Test: prompt enhancement is best-effort
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn enhance_prompt_returns_rewritten_text() {
    let backend = ScriptedBackend::new();
    backend.push_text(Ok("  a towering lighthouse lashed by storm waves  ".into()));
    let engine = test_engine(backend.clone());

    let enhanced = engine.enhance_prompt("a lighthouse", Tier::LowCost).await;

    assert_eq!(enhanced, "a towering lighthouse lashed by storm waves");
}

#[tokio::test(start_paused = true)]
async fn enhance_prompt_falls_back_to_original_after_auxiliary_budget() {
    let backend = ScriptedBackend::new();
    for _ in 0..5 {
        backend.push_text(Err(BackendError::http(503, "overloaded")));
    }
    let engine = test_engine(backend.clone());

    let enhanced = engine.enhance_prompt("a lighthouse", Tier::LowCost).await;

    assert_eq!(enhanced, "a lighthouse");
    assert_eq!(backend.calls_to("complete_text").len(), 2);
}

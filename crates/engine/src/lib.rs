//! Resilient generation engine.
//!
//! Turns one [`GenerationRequest`](atelier_core::generation::GenerationRequest)
//! into one committed artifact: resolves a credential, calls the backend,
//! retries transient failures with jittered exponential backoff, swaps a
//! premium model for its fast sibling once after a policy block, and polls
//! long-running (video) jobs to completion.

pub mod api;
pub mod backend;
pub mod classify;
pub mod error;
pub mod executor;
pub mod poller;
pub mod retry;

pub use backend::GenerationBackend;
pub use error::{BackendError, EngineError};
pub use executor::{EngineConfig, ExecutionEngine};

//! Shared domain types for the atelier generation engine.
//!
//! Zero internal dependencies: the credential pool, redaction rules,
//! health reporting, request/result types and the PNG settings codec
//! live here so the engine, campaign and worker crates can all use them.

pub mod credentials;
pub mod error;
pub mod generation;
pub mod health;
pub mod redaction;
pub mod settings_codec;
pub mod types;

//! Campaign worker: environment configuration, credential pool bootstrap,
//! health watchdog and the plan runner behind the `atelier-worker` binary.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod health;
pub mod runner;

pub use config::{ConfigError, WorkerConfig};
pub use error::WorkerError;
pub use runner::Worker;

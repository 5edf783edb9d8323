//! Campaign execution.
//!
//! A campaign is a brief plus an ordered list of shots. The
//! [`CampaignExecutor`] runs pending shots through the execution engine
//! with bounded concurrency, tracks each shot's lifecycle, and lets a
//! single shot be regenerated with feedback.

pub mod error;
pub mod events;
pub mod executor;
pub mod plan;
pub mod request_builder;
pub mod shot;
pub mod store;

pub use error::{CampaignError, StoreError};
pub use events::{CampaignEvent, RunSummary};
pub use executor::{CampaignExecutor, ExecutorOptions};
pub use plan::{CampaignBrief, CampaignPlan};
pub use shot::{Shot, ShotStatus};

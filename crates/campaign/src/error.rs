//! Campaign-level errors.
//!
//! These are precondition failures only. Generation failures never show up
//! here: they are recorded on the shot and the run carries on.

use atelier_core::types::ShotId;

use crate::shot::{ShotAction, ShotStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CampaignError {
    #[error("No campaign plan is loaded")]
    NoActiveCampaign,

    #[error("Shot not found: {0}")]
    ShotNotFound(ShotId),

    #[error("Shot {0} is already generating")]
    ShotBusy(ShotId),

    #[error("Shot {shot_id}: cannot {action} from {from}")]
    InvalidTransition {
        shot_id: ShotId,
        from: ShotStatus,
        action: ShotAction,
    },

    #[error("A campaign run is already in progress")]
    RunInProgress,

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Failure persisting a generated artifact.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact has no bytes")]
    Empty,
}

//! Shot lifecycle.
//!
//! ```text
//! PENDING --start--> GENERATING --succeed--> DONE
//!                    GENERATING --fail-----> FAILED
//! FAILED  --reset--> PENDING
//! DONE    --reject(feedback)-----------> GENERATING
//! FAILED  --retry_with_feedback--------> GENERATING
//! ```
//!
//! Transition checks are pure; the executor applies them while holding the
//! plan lock so "read status, write status" is one step.

use atelier_core::types::{EntityId, ShotId};
use serde::{Deserialize, Serialize};

use crate::error::CampaignError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShotStatus {
    #[default]
    Pending,
    Generating,
    Done,
    Failed,
}

impl ShotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Generating => "GENERATING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// `DONE` and `FAILED` end a pass; both can be re-entered explicitly.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for ShotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotAction {
    Start,
    Succeed,
    Fail,
    Reset,
    Reject,
    RetryWithFeedback,
}

impl ShotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail => "fail",
            Self::Reset => "reset",
            Self::Reject => "reject",
            Self::RetryWithFeedback => "retry_with_feedback",
        }
    }

    /// Status the shot lands in after this action.
    pub fn target(&self) -> ShotStatus {
        match self {
            Self::Start | Self::Reject | Self::RetryWithFeedback => ShotStatus::Generating,
            Self::Succeed => ShotStatus::Done,
            Self::Fail => ShotStatus::Failed,
            Self::Reset => ShotStatus::Pending,
        }
    }
}

impl std::fmt::Display for ShotAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions allowed from a given status.
pub fn valid_actions(from: ShotStatus) -> &'static [ShotAction] {
    match from {
        ShotStatus::Pending => &[ShotAction::Start],
        ShotStatus::Generating => &[ShotAction::Succeed, ShotAction::Fail],
        ShotStatus::Done => &[ShotAction::Reject],
        ShotStatus::Failed => &[ShotAction::Reset, ShotAction::RetryWithFeedback],
    }
}

pub fn can_apply(from: ShotStatus, action: ShotAction) -> bool {
    valid_actions(from).contains(&action)
}

// ---------------------------------------------------------------------------
// Shot
// ---------------------------------------------------------------------------

/// One unit of generation work inside a campaign plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    pub id: ShotId,
    #[serde(default)]
    pub status: ShotStatus,
    pub description: String,
    #[serde(default)]
    pub visual_details: String,
    /// Critique attached by the last regenerate action.
    #[serde(default)]
    pub feedback: Option<String>,
    /// Id of the stored artifact from the last successful pass.
    #[serde(default)]
    pub result_ref: Option<EntityId>,
    /// Redacted message from the last failed pass.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Shot {
    pub fn new(
        id: impl Into<ShotId>,
        description: impl Into<String>,
        visual_details: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: ShotStatus::Pending,
            description: description.into(),
            visual_details: visual_details.into(),
            feedback: None,
            result_ref: None,
            last_error: None,
        }
    }

    /// Apply `action`, or fail with [`CampaignError::InvalidTransition`]
    /// leaving the shot untouched.
    pub fn apply(&mut self, action: ShotAction) -> Result<(), CampaignError> {
        if !can_apply(self.status, action) {
            return Err(CampaignError::InvalidTransition {
                shot_id: self.id.clone(),
                from: self.status,
                action,
            });
        }
        self.status = action.target();
        match action {
            ShotAction::Start | ShotAction::Reject | ShotAction::RetryWithFeedback => {
                self.last_error = None;
            }
            ShotAction::Reset => {
                self.last_error = None;
                self.feedback = None;
            }
            ShotAction::Succeed | ShotAction::Fail => {}
        }
        Ok(())
    }
}

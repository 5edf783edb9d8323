//! Campaign progress events.
//!
//! [`CampaignEvents`] is a thin wrapper over a `tokio::sync::broadcast`
//! channel. Publishing never blocks and never fails; with no subscribers
//! the event is dropped.

use atelier_core::types::{EntityId, ShotId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Aggregate outcome of one `run_plan` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Shots selected at the start of the run.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Selected but never started (stopped, or claimed elsewhere first).
    pub skipped: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CampaignEvent {
    ShotStarted {
        shot_id: ShotId,
        at: Timestamp,
    },
    ShotCompleted {
        shot_id: ShotId,
        artifact_id: EntityId,
        model: String,
        fallback: bool,
        at: Timestamp,
    },
    ShotFailed {
        shot_id: ShotId,
        /// Redacted.
        error: String,
        at: Timestamp,
    },
    Progress {
        completed: usize,
        total: usize,
    },
    RunCompleted {
        summary: RunSummary,
        at: Timestamp,
    },
}

impl CampaignEvent {
    pub fn started(shot_id: &str) -> Self {
        Self::ShotStarted {
            shot_id: shot_id.to_string(),
            at: Utc::now(),
        }
    }

    pub fn completed(shot_id: &str, artifact_id: EntityId, model: &str, fallback: bool) -> Self {
        Self::ShotCompleted {
            shot_id: shot_id.to_string(),
            artifact_id,
            model: model.to_string(),
            fallback,
            at: Utc::now(),
        }
    }

    pub fn failed(shot_id: &str, error: &str) -> Self {
        Self::ShotFailed {
            shot_id: shot_id.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        }
    }

    pub fn run_completed(summary: RunSummary) -> Self {
        Self::RunCompleted {
            summary,
            at: Utc::now(),
        }
    }
}

/// Fan-out of [`CampaignEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct CampaignEvents {
    sender: broadcast::Sender<CampaignEvent>,
}

impl CampaignEvents {
    /// Slow receivers beyond `capacity` observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: CampaignEvent) {
        // Only fails when nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.sender.subscribe()
    }
}

impl Default for CampaignEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let events = CampaignEvents::default();
        let mut rx = events.subscribe();

        events.publish(CampaignEvent::started("s1"));
        events.publish(CampaignEvent::Progress {
            completed: 1,
            total: 2,
        });

        assert!(matches!(rx.recv().await.unwrap(), CampaignEvent::ShotStarted { shot_id, .. } if shot_id == "s1"));
        assert_eq!(
            rx.recv().await.unwrap(),
            CampaignEvent::Progress {
                completed: 1,
                total: 2
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        CampaignEvents::default().publish(CampaignEvent::failed("s1", "boom"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(CampaignEvent::Progress {
            completed: 3,
            total: 4,
        })
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["completed"], 3);
    }
}

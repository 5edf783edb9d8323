//! Campaign plans.

use std::collections::{BTreeMap, HashSet};

use atelier_core::credentials::Tier;
use atelier_core::generation::{AspectRatio, Capability, ReferenceInput, Resolution};
use serde::{Deserialize, Serialize};

use crate::error::CampaignError;
use crate::shot::Shot;

/// Upper bound of the intensity dial.
pub const MAX_INTENSITY: u8 = 100;

const DEFAULT_INTENSITY: u8 = 50;

fn default_intensity() -> u8 {
    DEFAULT_INTENSITY
}

fn default_tier() -> Tier {
    Tier::Premium
}

fn default_capability() -> Capability {
    Capability::Image
}

/// Campaign-wide settings every shot's request is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBrief {
    pub name: String,
    #[serde(default)]
    pub subject_brief: String,
    /// 0..=100 dial mapped into each prompt.
    #[serde(default = "default_intensity")]
    pub intensity: u8,
    #[serde(default = "default_capability")]
    pub capability: Capability,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    /// Reference images shared by every shot (subject, style, ...).
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceInput>,
}

impl CampaignBrief {
    pub fn new(name: impl Into<String>, subject_brief: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_brief: subject_brief.into(),
            intensity: DEFAULT_INTENSITY,
            capability: Capability::Image,
            tier: Tier::Premium,
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            references: BTreeMap::new(),
        }
    }
}

/// A brief plus its ordered shots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPlan {
    #[serde(flatten)]
    pub brief: CampaignBrief,
    pub shots: Vec<Shot>,
}

impl CampaignPlan {
    pub fn new(brief: CampaignBrief, shots: Vec<Shot>) -> Self {
        Self { brief, shots }
    }

    /// Parse and validate an authored plan.
    pub fn from_json(json: &str) -> Result<Self, CampaignError> {
        let plan: Self = serde_json::from_str(json)
            .map_err(|e| CampaignError::Validation(format!("Invalid plan JSON: {e}")))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Rules:
    /// - Name must not be blank.
    /// - Intensity must not exceed [`MAX_INTENSITY`].
    /// - Shot ids must be non-blank and unique.
    /// - Shot descriptions must not be blank.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.brief.name.trim().is_empty() {
            return Err(CampaignError::Validation(
                "Campaign name must not be empty".to_string(),
            ));
        }
        if self.brief.intensity > MAX_INTENSITY {
            return Err(CampaignError::Validation(format!(
                "Intensity must be between 0 and {MAX_INTENSITY}, got {}",
                self.brief.intensity
            )));
        }

        let mut seen = HashSet::new();
        for shot in &self.shots {
            if shot.id.trim().is_empty() {
                return Err(CampaignError::Validation(
                    "Shot id must not be empty".to_string(),
                ));
            }
            if !seen.insert(shot.id.as_str()) {
                return Err(CampaignError::Validation(format!(
                    "Duplicate shot id: {}",
                    shot.id
                )));
            }
            if shot.description.trim().is_empty() {
                return Err(CampaignError::Validation(format!(
                    "Shot {} has no description",
                    shot.id
                )));
            }
        }
        Ok(())
    }

    pub fn shot(&self, id: &str) -> Option<&Shot> {
        self.shots.iter().find(|s| s.id == id)
    }

    pub fn shot_mut(&mut self, id: &str) -> Option<&mut Shot> {
        self.shots.iter_mut().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::shot::ShotStatus;

    #[test]
    fn parses_authored_plan_with_defaults() {
        let plan = CampaignPlan::from_json(
            r#"{
                "name": "Autumn drop",
                "subjectBrief": "a leather satchel",
                "aspectRatio": "4:3",
                "shots": [
                    { "id": "s1", "description": "on a desk", "visualDetails": "warm light" },
                    { "id": "s2", "description": "in the rain" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(plan.brief.intensity, 50);
        assert_eq!(plan.brief.tier, Tier::Premium);
        assert_eq!(plan.brief.aspect_ratio, AspectRatio::Classic);
        assert_eq!(plan.shots.len(), 2);
        assert_eq!(plan.shots[1].status, ShotStatus::Pending);
        assert_eq!(plan.shots[1].visual_details, "");
    }

    #[test]
    fn rejects_duplicate_shot_ids() {
        let plan = CampaignPlan::new(
            CampaignBrief::new("c", "b"),
            vec![Shot::new("a", "one", ""), Shot::new("a", "two", "")],
        );
        assert_matches!(plan.validate(), Err(CampaignError::Validation(m)) if m.contains("Duplicate"));
    }

    #[test]
    fn rejects_blank_name() {
        let plan = CampaignPlan::new(CampaignBrief::new("  ", "b"), vec![]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn rejects_intensity_above_range() {
        let mut brief = CampaignBrief::new("c", "b");
        brief.intensity = 101;
        assert!(CampaignPlan::new(brief, vec![]).validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert_matches!(
            CampaignPlan::from_json("{not json"),
            Err(CampaignError::Validation(_))
        );
    }
}

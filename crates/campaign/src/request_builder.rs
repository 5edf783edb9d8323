//! Mapping a shot into a concrete [`GenerationRequest`].
//!
//! Prompt authoring proper lives outside this crate; the executor only
//! needs something implementing [`RequestBuilder`]. [`TemplateRequestBuilder`]
//! is a plain-text default used by the worker binary and tests.

use atelier_core::generation::{GenerationRequest, ModelCatalog};

use crate::error::CampaignError;
use crate::plan::CampaignBrief;
use crate::shot::Shot;

pub trait RequestBuilder: Send + Sync {
    /// Build the request for `shot`. Feedback on the shot must be reflected
    /// in the prompt.
    fn build(&self, brief: &CampaignBrief, shot: &Shot) -> Result<GenerationRequest, CampaignError>;
}

/// Assembles the prompt from the brief, the shot and any feedback, and
/// picks the catalog model for the brief's capability and tier.
#[derive(Debug, Clone, Default)]
pub struct TemplateRequestBuilder {
    catalog: ModelCatalog,
}

impl TemplateRequestBuilder {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    fn prompt(brief: &CampaignBrief, shot: &Shot) -> String {
        let mut prompt = String::new();
        if !brief.subject_brief.trim().is_empty() {
            prompt.push_str(brief.subject_brief.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str("Shot: ");
        prompt.push_str(shot.description.trim());
        if !shot.visual_details.trim().is_empty() {
            prompt.push_str("\nVisual details: ");
            prompt.push_str(shot.visual_details.trim());
        }
        prompt.push_str(&format!("\nIntensity: {}/100", brief.intensity));
        if let Some(feedback) = shot.feedback.as_deref().map(str::trim) {
            if !feedback.is_empty() {
                prompt.push_str("\nRevision feedback: ");
                prompt.push_str(feedback);
            }
        }
        prompt
    }
}

impl RequestBuilder for TemplateRequestBuilder {
    fn build(&self, brief: &CampaignBrief, shot: &Shot) -> Result<GenerationRequest, CampaignError> {
        let model = self.catalog.model_for(brief.capability, brief.tier);
        let mut request =
            GenerationRequest::new(brief.capability, brief.tier, model, Self::prompt(brief, shot))
                .with_aspect_ratio(brief.aspect_ratio)
                .with_resolution(brief.resolution);
        for (name, input) in &brief.references {
            request = request.with_reference(name.clone(), input.clone());
        }
        Ok(request)
    }
}

//! Generation request/result types and the model catalog.
//!
//! A [`GenerationRequest`] is built by a prompt-construction collaborator
//! and handed to the execution engine unchanged; the engine answers with a
//! [`GenerationResult`] whose ownership passes to the caller.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::credentials::Tier;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Tag attached to results produced by the fallback model.
pub const TAG_FALLBACK: &str = "fallback";

/// Default premium (high-fidelity) image model.
pub const DEFAULT_PREMIUM_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Default fast (low-cost) image model.
pub const DEFAULT_FAST_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
/// Default premium video model.
pub const DEFAULT_PREMIUM_VIDEO_MODEL: &str = "veo-3.1-generate-preview";
/// Default fast video model.
pub const DEFAULT_FAST_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
/// Default text model used for auxiliary calls (prompt enhancement).
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What kind of artifact a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Image,
    Video,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    ClassicPortrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Classic => "4:3",
            Self::ClassicPortrait => "3:4",
        }
    }
}

/// Resolution tier. `Standard` is what the fallback model is forced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Standard,
    High,
    Ultra,
}

impl Resolution {
    /// Image size token sent with image-class calls.
    pub fn image_size(&self) -> &'static str {
        match self {
            Self::Standard => "1K",
            Self::High => "2K",
            Self::Ultra => "4K",
        }
    }

    /// Resolution token sent with video-class calls.
    pub fn video_resolution(&self) -> &'static str {
        match self {
            Self::Standard => "720p",
            Self::High | Self::Ultra => "1080p",
        }
    }
}

// ---------------------------------------------------------------------------
// Reference inputs
// ---------------------------------------------------------------------------

/// A reference image handed to the backend alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceInput {
    /// Raw bytes with a known MIME type.
    Bytes { mime: String, data: Vec<u8> },
    /// A `data:<mime>;base64,<payload>` URI.
    DataUri { uri: String },
}

impl ReferenceInput {
    /// Resolve into `(mime, bytes)`, decoding data URIs.
    pub fn to_inline(&self) -> Result<(String, Vec<u8>), CoreError> {
        match self {
            Self::Bytes { mime, data } => Ok((mime.clone(), data.clone())),
            Self::DataUri { uri } => decode_data_uri(uri),
        }
    }
}

/// Decode a base64 data URI into its MIME type and payload.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), CoreError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CoreError::Validation("Reference input is not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| CoreError::Validation("Data URI has no payload".to_string()))?;
    let mime = meta.strip_suffix(";base64").ok_or_else(|| {
        CoreError::Validation("Only base64-encoded data URIs are supported".to_string())
    })?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| CoreError::Validation(format!("Invalid base64 in data URI: {e}")))?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Ok((mime.to_string(), bytes))
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// An abstract generation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub capability: Capability,
    /// Credential tier the call is billed against.
    pub tier: Tier,
    /// Model the caller would like to use.
    pub model: String,
    pub prompt: String,
    /// Named reference images, sent in name order.
    #[serde(default)]
    pub reference_inputs: BTreeMap<String, ReferenceInput>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub seed: Option<i64>,
    /// Start frame for video-class jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<ReferenceInput>,
}

impl GenerationRequest {
    pub fn new(
        capability: Capability,
        tier: Tier,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            tier,
            model: model.into(),
            prompt: prompt.into(),
            reference_inputs: BTreeMap::new(),
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            seed: None,
            source_image: None,
        }
    }

    pub fn with_reference(mut self, name: impl Into<String>, input: ReferenceInput) -> Self {
        self.reference_inputs.insert(name.into(), input);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_source_image(mut self, input: ReferenceInput) -> Self {
        self.source_image = Some(input);
        self
    }

    /// Settings document embedded into stored artifacts so the exact
    /// configuration can be restored later. Binary payloads are omitted.
    pub fn settings_json(&self) -> serde_json::Value {
        serde_json::json!({
            "mode": self.capability.as_str(),
            "settings": {
                "model": self.model,
                "tier": self.tier.as_str(),
                "prompt": self.prompt,
                "aspectRatio": self.aspect_ratio.as_str(),
                "resolution": self.resolution,
                "seed": self.seed,
                "references": self.reference_inputs.keys().collect::<Vec<_>>(),
            },
        })
    }
}

/// A committed artifact produced by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(skip)]
    pub artifact_bytes: Vec<u8>,
    pub mime_type: String,
    /// `data:` URI for inline results or the backend's download URI.
    pub artifact_uri: String,
    pub model_actually_used: String,
    pub tier_actually_used: Tier,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
}

impl GenerationResult {
    /// Whether the fallback model produced this artifact.
    pub fn is_fallback(&self) -> bool {
        self.tags.iter().any(|t| t == TAG_FALLBACK)
    }
}

/// Build a `data:` URI for inline artifact bytes.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

// ---------------------------------------------------------------------------
// Model catalog
// ---------------------------------------------------------------------------

/// Known model identifiers and the premium -> fast fallback pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub premium_image: String,
    pub fast_image: String,
    pub premium_video: String,
    pub fast_video: String,
    pub text: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            premium_image: DEFAULT_PREMIUM_IMAGE_MODEL.to_string(),
            fast_image: DEFAULT_FAST_IMAGE_MODEL.to_string(),
            premium_video: DEFAULT_PREMIUM_VIDEO_MODEL.to_string(),
            fast_video: DEFAULT_FAST_VIDEO_MODEL.to_string(),
            text: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

impl ModelCatalog {
    /// The fast model to substitute after a policy block, if `model` is a
    /// premium model. Fast and unknown models have no fallback.
    pub fn fallback_for(&self, model: &str) -> Option<&str> {
        if model == self.premium_image {
            Some(&self.fast_image)
        } else if model == self.premium_video {
            Some(&self.fast_video)
        } else {
            None
        }
    }

    /// Default model for a capability at a given tier.
    pub fn model_for(&self, capability: Capability, tier: Tier) -> &str {
        match (capability, tier) {
            (Capability::Image, Tier::Premium) => &self.premium_image,
            (Capability::Image, Tier::LowCost) => &self.fast_image,
            (Capability::Video, Tier::Premium) => &self.premium_video,
            (Capability::Video, Tier::LowCost) => &self.fast_video,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_data_uri() {
        let (mime, bytes) = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn rejects_non_data_uri() {
        let err = decode_data_uri("https://example.com/a.png").unwrap_err();
        assert!(matches!(err, CoreError::Validation(m) if m.contains("not a data URI")));
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn rejects_corrupt_base64() {
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn data_uri_helper_round_trips() {
        let uri = to_data_uri("image/png", b"\x89PNG");
        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG");
    }

    #[test]
    fn premium_models_fall_back_to_fast() {
        let catalog = ModelCatalog::default();
        assert_eq!(
            catalog.fallback_for(DEFAULT_PREMIUM_IMAGE_MODEL),
            Some(DEFAULT_FAST_IMAGE_MODEL)
        );
        assert_eq!(
            catalog.fallback_for(DEFAULT_PREMIUM_VIDEO_MODEL),
            Some(DEFAULT_FAST_VIDEO_MODEL)
        );
    }

    #[test]
    fn fast_and_unknown_models_have_no_fallback() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.fallback_for(DEFAULT_FAST_IMAGE_MODEL), None);
        assert_eq!(catalog.fallback_for("some-other-model"), None);
    }

    #[test]
    fn settings_json_omits_binary_payloads() {
        let request = GenerationRequest::new(Capability::Image, Tier::Premium, "m", "a red fox")
            .with_reference(
                "subject",
                ReferenceInput::Bytes {
                    mime: "image/png".into(),
                    data: vec![1, 2, 3],
                },
            )
            .with_seed(7);
        let json = request.settings_json();
        assert_eq!(json["mode"], "image");
        assert_eq!(json["settings"]["seed"], 7);
        assert_eq!(json["settings"]["references"][0], "subject");
        assert!(json.to_string().find("[1,2,3]").is_none());
    }

    #[test]
    fn resolution_tokens() {
        assert_eq!(Resolution::Standard.image_size(), "1K");
        assert_eq!(Resolution::Ultra.image_size(), "4K");
        assert_eq!(Resolution::Standard.video_resolution(), "720p");
    }
}

//! Backend seam: the logical generation call contract.
//!
//! [`GenerationBackend`] is implemented by the HTTP client in
//! [`crate::api`] and by scripted backends in tests. Responses are decoded
//! once into [`BackendResponse`] so the engine never re-inspects raw
//! payloads.

use async_trait::async_trait;
use atelier_core::generation::{AspectRatio, Capability, GenerationRequest, Resolution};

use crate::error::{BackendError, EngineError};

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// One piece of the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    InlineBinary { mime: String, bytes: Vec<u8> },
}

/// Safety filter threshold applied to every harm category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockThreshold {
    BlockNone,
    #[default]
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl BlockThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockNone => "BLOCK_NONE",
            Self::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            Self::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            Self::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

/// Decoded image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    /// Optional first frame the video starts from.
    pub start_frame: Option<InlineImage>,
}

/// A fully-resolved backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCall {
    pub model: String,
    pub parts: Vec<PromptPart>,
    pub image_config: Option<ImageConfig>,
    pub video_config: Option<VideoConfig>,
    pub seed: Option<i64>,
    pub safety: BlockThreshold,
}

impl GenerationCall {
    /// Build the call for `request` against `model` at `resolution`.
    ///
    /// Every field other than model and resolution comes from the request
    /// unchanged. Undecodable reference inputs fail as a non-retryable
    /// [`EngineError::InvalidRequest`].
    pub fn build(
        request: &GenerationRequest,
        model: &str,
        resolution: Resolution,
    ) -> Result<Self, EngineError> {
        let mut parts = vec![PromptPart::Text(request.prompt.clone())];
        for (name, input) in &request.reference_inputs {
            let (mime, bytes) = input
                .to_inline()
                .map_err(|e| EngineError::InvalidRequest(format!("reference '{name}': {e}")))?;
            parts.push(PromptPart::InlineBinary { mime, bytes });
        }

        let (image_config, video_config) = match request.capability {
            Capability::Image => (
                Some(ImageConfig {
                    aspect_ratio: request.aspect_ratio,
                    resolution,
                }),
                None,
            ),
            Capability::Video => (
                None,
                Some(VideoConfig {
                    aspect_ratio: request.aspect_ratio,
                    resolution,
                    start_frame: start_frame(request)?,
                }),
            ),
        };

        Ok(Self {
            model: model.to_string(),
            parts,
            image_config,
            video_config,
            seed: request.seed,
            safety: BlockThreshold::default(),
        })
    }

    /// Concatenated text parts.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::InlineBinary { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn start_frame(request: &GenerationRequest) -> Result<Option<InlineImage>, EngineError> {
    let Some(input) = &request.source_image else {
        return Ok(None);
    };
    let (mime, bytes) = input
        .to_inline()
        .map_err(|e| EngineError::InvalidRequest(format!("start frame: {e}")))?;
    Ok(Some(InlineImage { mime, bytes }))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Why the backend withheld an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Safety,
    ImageSafety,
    ImageOther,
    Other,
}

impl FinishReason {
    /// Parse a backend finish reason. Reasons that do not signal a
    /// withheld artifact (`STOP`, `MAX_TOKENS`, ...) yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => Some(Self::Safety),
            "IMAGE_SAFETY" | "IMAGE_PROHIBITED_CONTENT" => Some(Self::ImageSafety),
            "IMAGE_OTHER" => Some(Self::ImageOther),
            "OTHER" | "NO_IMAGE" => Some(Self::Other),
            _ => None,
        }
    }

    /// Safety/content-policy reasons, as opposed to unspecified faults.
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::Safety | Self::ImageSafety)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safety => "SAFETY",
            Self::ImageSafety => "IMAGE_SAFETY",
            Self::ImageOther => "IMAGE_OTHER",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded synchronous generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendResponse {
    /// An artifact part was returned.
    Artifact {
        mime: String,
        bytes: Vec<u8>,
        response_id: Option<String>,
    },
    /// Output withheld (policy block or unspecified internal fault).
    Blocked {
        reason: FinishReason,
        detail: Option<String>,
    },
    /// The model answered with text instead of an artifact.
    Refusal { text: String },
}

/// Opaque token for an in-progress long-running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle(pub String);

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of polling an [`OperationHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStatus {
    pub done: bool,
    pub error: Option<String>,
    pub result_uri: Option<String>,
}

/// Bytes downloaded from a job's result location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub mime: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A generation backend. Implementations perform exactly one network
/// interaction per call; retries and fallbacks live in the engine.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Synchronous (image-class) generation.
    async fn generate(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<BackendResponse, BackendError>;

    /// Submit a long-running (video-class) job.
    async fn submit_job(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<OperationHandle, BackendError>;

    /// Poll a long-running job.
    async fn job_status(
        &self,
        credential: &str,
        handle: &OperationHandle,
    ) -> Result<JobStatus, BackendError>;

    /// Download a finished job's artifact.
    async fn fetch_artifact(
        &self,
        credential: &str,
        uri: &str,
    ) -> Result<FetchedArtifact, BackendError>;

    /// Plain text completion, used for auxiliary calls.
    async fn complete_text(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use atelier_core::credentials::Tier;
    use atelier_core::generation::ReferenceInput;

    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new(Capability::Image, Tier::Premium, "premium", "a lighthouse")
            .with_reference(
                "b_style",
                ReferenceInput::DataUri {
                    uri: "data:image/jpeg;base64,AQID".into(),
                },
            )
            .with_reference(
                "a_subject",
                ReferenceInput::Bytes {
                    mime: "image/png".into(),
                    data: vec![9],
                },
            )
            .with_resolution(Resolution::Ultra)
            .with_seed(11)
    }

    #[test]
    fn build_orders_prompt_then_references_by_name() {
        let call = GenerationCall::build(&request(), "premium", Resolution::Ultra).unwrap();
        assert_eq!(call.parts.len(), 3);
        assert_eq!(call.parts[0], PromptPart::Text("a lighthouse".into()));
        assert_eq!(
            call.parts[1],
            PromptPart::InlineBinary {
                mime: "image/png".into(),
                bytes: vec![9]
            }
        );
        assert_eq!(
            call.parts[2],
            PromptPart::InlineBinary {
                mime: "image/jpeg".into(),
                bytes: vec![1, 2, 3]
            }
        );
        assert_eq!(call.seed, Some(11));
        assert!(call.video_config.is_none());
    }

    #[test]
    fn build_overrides_only_model_and_resolution() {
        let req = request();
        let primary = GenerationCall::build(&req, "premium", req.resolution).unwrap();
        let fallback = GenerationCall::build(&req, "fast", Resolution::Standard).unwrap();

        assert_eq!(fallback.model, "fast");
        assert_eq!(fallback.image_config.unwrap().resolution, Resolution::Standard);
        assert_eq!(fallback.parts, primary.parts);
        assert_eq!(fallback.seed, primary.seed);
        assert_eq!(
            fallback.image_config.unwrap().aspect_ratio,
            primary.image_config.unwrap().aspect_ratio
        );
    }

    #[test]
    fn build_rejects_bad_data_uri() {
        let req = GenerationRequest::new(Capability::Image, Tier::LowCost, "m", "p").with_reference(
            "broken",
            ReferenceInput::DataUri {
                uri: "not-a-data-uri".into(),
            },
        );
        let err = GenerationCall::build(&req, "m", Resolution::Standard).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(m) if m.contains("broken")));
    }

    #[test]
    fn video_call_carries_start_frame() {
        let req = GenerationRequest::new(Capability::Video, Tier::Premium, "v", "waves")
            .with_source_image(ReferenceInput::DataUri {
                uri: "data:image/webp;base64,Bwc=".into(),
            });
        let call = GenerationCall::build(&req, "v", Resolution::High).unwrap();
        let video = call.video_config.unwrap();
        assert_eq!(
            video.start_frame,
            Some(InlineImage {
                mime: "image/webp".into(),
                bytes: vec![7, 7],
            })
        );
        assert!(call.image_config.is_none());
    }

    #[test]
    fn undecodable_start_frame_is_invalid_request() {
        let req = GenerationRequest::new(Capability::Video, Tier::Premium, "v", "waves")
            .with_source_image(ReferenceInput::DataUri {
                uri: "data:image/png,raw".into(),
            });
        let err = GenerationCall::build(&req, "v", Resolution::High).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(m) if m.contains("start frame")));
    }

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::parse("IMAGE_SAFETY"), Some(FinishReason::ImageSafety));
        assert_eq!(FinishReason::parse("OTHER"), Some(FinishReason::Other));
        assert_eq!(FinishReason::parse("STOP"), None);
        assert!(FinishReason::Safety.is_policy());
        assert!(!FinishReason::ImageOther.is_policy());
    }
}

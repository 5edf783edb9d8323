//! REST client for the generative backend.
//!
//! Implements [`GenerationBackend`] over the public HTTP API: synchronous
//! `generateContent` calls for images and text, `predictLongRunning` plus
//! operation polling for video. Wire payloads are decoded into the
//! engine's [`BackendResponse`] in one place, [`decode_generate_response`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::backend::{
    BackendResponse, FetchedArtifact, FinishReason, GenerationBackend, GenerationCall, JobStatus,
    OperationHandle, PromptPart,
};
use crate::error::BackendError;

/// Public endpoint of the generative API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_VERSION: &str = "v1beta";

const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Per-request ceiling. Long-running work is polled, so no single request
/// should take this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP backend for a single API base URL.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url`, e.g. [`DEFAULT_BASE_URL`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/{API_VERSION}/models/{model}:{method}", self.base_url)
    }

    // ---- private helpers ----

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credential: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, credential)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::parse_response(response).await
    }

    /// Return the response on 2xx, or a [`BackendError`] carrying the
    /// status and the backend's error message.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(BackendError::http(status.as_u16(), error_message(&body)))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::transport(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<BackendResponse, BackendError> {
        let url = self.model_url(&call.model, "generateContent");
        let body = GenerateRequest::for_call(call);
        let response: GenerateResponse = self.post_json(&url, credential, &body).await?;
        Ok(decode_generate_response(response))
    }

    async fn submit_job(
        &self,
        credential: &str,
        call: &GenerationCall,
    ) -> Result<OperationHandle, BackendError> {
        let url = self.model_url(&call.model, "predictLongRunning");
        let body = PredictRequest::for_call(call);
        let operation: Operation = self.post_json(&url, credential, &body).await?;
        Ok(OperationHandle(operation.name))
    }

    async fn job_status(
        &self,
        credential: &str,
        handle: &OperationHandle,
    ) -> Result<JobStatus, BackendError> {
        let response = self
            .client
            .get(format!("{}/{API_VERSION}/{}", self.base_url, handle.0))
            .header(API_KEY_HEADER, credential)
            .send()
            .await
            .map_err(transport_error)?;
        let operation: Operation = Self::parse_response(response).await?;
        Ok(operation.into_status())
    }

    async fn fetch_artifact(
        &self,
        credential: &str,
        uri: &str,
    ) -> Result<FetchedArtifact, BackendError> {
        let response = self
            .client
            .get(uri)
            .header(API_KEY_HEADER, credential)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::ensure_success(response).await?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(FetchedArtifact {
            mime,
            bytes: bytes.to_vec(),
        })
    }

    async fn complete_text(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let url = self.model_url(model, "generateContent");
        let body = GenerateRequest::text(prompt);
        let response: GenerateResponse = self.post_json(&url, credential, &body).await?;
        match decode_generate_response(response) {
            BackendResponse::Refusal { text } => Ok(text),
            BackendResponse::Blocked { reason, .. } => {
                Err(BackendError::transport(format!("text completion withheld: {reason}")))
            }
            BackendResponse::Artifact { .. } => Err(BackendError::transport(
                "text completion returned binary data",
            )),
        }
    }
}

/// Map a transport failure to a [`BackendError`] whose message carries the
/// markers the classifier recognises as transient.
fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        BackendError::transport(format!("backend unavailable: {err}"))
    } else {
        BackendError::transport(err.to_string())
    }
}

/// Pull `error.message` out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

impl GenerateRequest {
    fn for_call(call: &GenerationCall) -> Self {
        let parts = call
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => WirePart::text(text),
                PromptPart::InlineBinary { mime, bytes } => WirePart::inline(mime, bytes),
            })
            .collect();

        let image_config = call.image_config.map(|c| WireImageConfig {
            aspect_ratio: c.aspect_ratio.as_str(),
            image_size: c.resolution.image_size(),
        });

        Self {
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT", "IMAGE"]),
                image_config,
                seed: call.seed,
            }),
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: call.safety.as_str(),
                })
                .collect(),
        }
    }

    fn text(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![WirePart::text(prompt)],
            }],
            generation_config: None,
            safety_settings: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    fn inline(mime: &str, bytes: &[u8]) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime.to_string(),
                data: BASE64.encode(bytes),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<WireImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireImageConfig {
    aspect_ratio: &'static str,
    image_size: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

impl PredictRequest {
    fn for_call(call: &GenerationCall) -> Self {
        let video = call.video_config.as_ref();
        let image = video
            .and_then(|v| v.start_frame.as_ref())
            .map(|frame| StartFrame {
                bytes_base64_encoded: BASE64.encode(&frame.bytes),
                mime_type: frame.mime.clone(),
            });

        Self {
            instances: vec![PredictInstance {
                prompt: call.prompt_text(),
                image,
            }],
            parameters: PredictParameters {
                aspect_ratio: video.map(|v| v.aspect_ratio.as_str()),
                resolution: video.map(|v| v.resolution.video_resolution()),
                seed: call.seed,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<StartFrame>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartFrame {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    response_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    finish_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

impl Operation {
    fn into_status(self) -> JobStatus {
        let result_uri = self.response.as_ref().and_then(|r| {
            r.pointer("/generateVideoResponse/generatedSamples/0/video/uri")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        JobStatus {
            done: self.done,
            error: self.error.map(|e| e.message),
            result_uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Decode a `generateContent` response.
///
/// An inline binary part wins; otherwise a recognised finish or block
/// reason means the artifact was withheld; otherwise any text is the
/// model explaining itself instead of producing output.
pub fn decode_generate_response(response: GenerateResponse) -> BackendResponse {
    let response_id = response.response_id;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let feedback = response.prompt_feedback.unwrap_or_default();
        let reason = feedback
            .block_reason
            .as_deref()
            .and_then(FinishReason::parse)
            .unwrap_or(FinishReason::Safety);
        let detail = feedback.block_reason_message.or(feedback.block_reason);
        return BackendResponse::Blocked { reason, detail };
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut texts = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            if let Ok(bytes) = BASE64.decode(inline.data.as_bytes()) {
                return BackendResponse::Artifact {
                    mime: inline.mime_type,
                    bytes,
                    response_id,
                };
            }
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    if let Some(reason) = candidate.finish_reason.as_deref().and_then(FinishReason::parse) {
        return BackendResponse::Blocked {
            reason,
            detail: candidate.finish_message,
        };
    }

    let text = texts.join("\n");
    if text.trim().is_empty() {
        BackendResponse::Blocked {
            reason: FinishReason::Other,
            detail: Some("response carried no artifact".to_string()),
        }
    } else {
        BackendResponse::Refusal { text }
    }
}

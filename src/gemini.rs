use crate::config::Config;
use crate::error::{classify_message, StudioError};
use crate::models::{Ratio, Resolution};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

/// One inline image part for a model call: raw base64 plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePart {
    pub mime_type: String,
    pub data: String,
}

/// A text-model invocation: prompt plus any attached images.
#[derive(Debug, Clone)]
pub struct TextPrompt {
    pub prompt: String,
    pub images: Vec<InlinePart>,
}

/// An image-model invocation.
#[derive(Debug, Clone)]
pub struct ImagePrompt {
    pub prompt: String,
    pub images: Vec<InlinePart>,
    pub ratio: Ratio,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: String,
}

/// Uniform seam over the generative model. The pipeline and its tests only
/// see this trait; `GeminiBackend` is the production implementation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_text(&self, credential: &str, request: &TextPrompt)
        -> Result<String, StudioError>;
    async fn generate_image(
        &self,
        credential: &str,
        request: &ImagePrompt,
    ) -> Result<GeneratedImage, StudioError>;
}

/// Server-configured shared credential always wins over a caller-supplied
/// one; with neither, the call fails before any network traffic.
pub fn resolve_credential(
    server: Option<&str>,
    caller: Option<&str>,
) -> Result<String, StudioError> {
    let present = |key: Option<&str>| {
        key.map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    };
    present(server)
        .or_else(|| present(caller))
        .ok_or(StudioError::MissingCredential)
}

/// Parse a `data:<mime>;base64,<payload>` string into an inline part,
/// verifying the payload actually decodes.
pub fn parse_data_url(value: &str) -> Result<InlinePart, StudioError> {
    let rest = value
        .strip_prefix("data:")
        .ok_or_else(|| StudioError::InvalidInput("image is not a data URL".to_string()))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| StudioError::InvalidInput("image data URL is not base64".to_string()))?;
    if mime_type.is_empty() || !mime_type.contains('/') {
        return Err(StudioError::InvalidInput(format!(
            "image data URL has malformed mime type \"{mime_type}\""
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| StudioError::InvalidInput("image payload is not valid base64".to_string()))?;
    Ok(InlinePart {
        mime_type: mime_type.to_string(),
        data: payload.to_string(),
    })
}

pub fn to_data_url(mime_type: &str, data_b64: &str) -> String {
    format!("data:{mime_type};base64,{data_b64}")
}

/// Short preview of payloads for logs; never splits a UTF-8 character.
fn preview(data: &str) -> String {
    let total = data.chars().count();
    if total > 50 {
        let head: String = data.chars().take(50).collect();
        format!("{head}...[{total} chars total]")
    } else {
        data.to_string()
    }
}

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    text_model: String,
    image_model: String,
    thinking_budget: u32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base.clone(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            thinking_budget: config.thinking_budget,
            max_output_tokens: config.max_output_tokens,
            timeout: config.request_timeout,
        }
    }

    fn url(&self, model: &str, credential: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, credential
        )
    }

    fn parts(prompt: &str, images: &[InlinePart]) -> Vec<serde_json::Value> {
        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }));
        }
        parts
    }

    async fn call(
        &self,
        model: &str,
        credential: &str,
        body: serde_json::Value,
    ) -> Result<GeminiResponse, StudioError> {
        let url = self.url(model, credential);
        info!("🔗 calling {}", url.replace(credential, "***"));

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StudioError::Timeout(e.to_string())
                } else {
                    StudioError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StudioError::Network(e.to_string()))?;

        if !status.is_success() {
            error!(%status, body = %preview(&text), "❌ upstream rejected the call");
            return Err(classify_upstream(status, &text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|e| {
            StudioError::InvalidFormat(format!("unparsable upstream envelope: {e}"))
        })?;

        if let Some(feedback) = &parsed.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                warn!(%reason, "prompt blocked upstream");
                return Err(StudioError::ContentBlocked(format!(
                    "prompt blocked: {reason}"
                )));
            }
        }
        if let Some(candidate) = parsed.candidates.first() {
            if let Some(reason) = &candidate.finish_reason {
                if reason == "SAFETY" || reason == "PROHIBITED_CONTENT" {
                    warn!(%reason, "candidate blocked upstream");
                    return Err(StudioError::ContentBlocked(format!(
                        "candidate blocked: {reason}"
                    )));
                }
            }
        }

        Ok(parsed)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_text(
        &self,
        credential: &str,
        request: &TextPrompt,
    ) -> Result<String, StudioError> {
        let mut generation_config = json!({
            "temperature": 0.7,
            "topP": 0.95,
            "maxOutputTokens": self.max_output_tokens,
        });
        if self.thinking_budget > 0 {
            generation_config["thinkingConfig"] = json!({ "thinkingBudget": self.thinking_budget });
        }
        let body = json!({
            "contents": [{ "parts": Self::parts(&request.prompt, &request.images) }],
            "generationConfig": generation_config,
        });

        let parsed = self.call(&self.text_model, credential, body).await?;
        let text = parsed.first_text();
        if text.is_empty() {
            return Err(StudioError::InvalidFormat(
                "no text content in response".to_string(),
            ));
        }
        info!(chars = text.len(), "✅ text generated");
        Ok(text)
    }

    async fn generate_image(
        &self,
        credential: &str,
        request: &ImagePrompt,
    ) -> Result<GeneratedImage, StudioError> {
        let body = json!({
            "contents": [{ "parts": Self::parts(&request.prompt, &request.images) }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.ratio.aspect(),
                    "imageSize": request.resolution.as_str(),
                },
            },
        });

        let parsed = self.call(&self.image_model, credential, body).await?;
        match parsed.first_image() {
            Some(image) => {
                info!(
                    mime = %image.mime_type,
                    data = %preview(&image.data),
                    "🖼️ image generated"
                );
                Ok(image)
            }
            None => Err(StudioError::InvalidFormat(
                "no image data in response".to_string(),
            )),
        }
    }
}

/// Status codes give a precise category where we have them; otherwise fall
/// back to marker matching on the body text.
fn classify_upstream(status: StatusCode, body: &str) -> StudioError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StudioError::AuthInvalid(format!("status={status} body={}", preview(body)))
        }
        StatusCode::TOO_MANY_REQUESTS => StudioError::RateLimited {
            retry_after_secs: None,
        },
        s if s.is_server_error() => {
            StudioError::ServiceUnavailable(format!("status={status} body={}", preview(body)))
        }
        _ => classify_message(&format!("status={status} body={body}")),
    }
}

// --- Response parsing ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn first_text(&self) -> String {
        let Some(candidate) = self.candidates.first() else {
            return String::new();
        };
        let mut out = String::new();
        for part in &candidate.content.parts {
            if let Part::Text { text } = part {
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    /// First inline image across candidates.
    fn first_image(&self) -> Option<GeneratedImage> {
        for candidate in &self.candidates {
            for part in &candidate.content.parts {
                if let Part::Inline { inline_data } = part {
                    return Some(GeneratedImage {
                        mime_type: inline_data.mime_type.clone(),
                        data: inline_data.data.clone(),
                    });
                }
            }
        }
        None
    }
}

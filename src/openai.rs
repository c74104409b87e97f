use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, error};

use crate::tagger::ImagePayload;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("request timed out: {0}")] Timeout(String),
    #[error("network error: {0}")] Network(String),
    #[error("authentication rejected (HTTP {status}): {body}")] Auth { status: u16, body: String },
    #[error("rate limited (HTTP 429): {0}")] RateLimited(String),
    #[error("HTTP {status}: {body}")] Status { status: u16, body: String },
    #[error("malformed response: {0}")] Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptionError {
    #[error("captioning unavailable: {0}")] Unavailable(String),
    #[error("captioning failed: {0}")] Failed(String),
}

impl From<GenerationError> for CaptionError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout(_) | GenerationError::Network(_) => CaptionError::Unavailable(e.to_string()),
            other => CaptionError::Failed(other.to_string()),
        }
    }
}

/// One chat-completion call: a system instruction, a user instruction and sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the generated text, trimmed.
    async fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, instruction: &str, image: &ImagePayload) -> Result<String, CaptionError>;
}

pub const MOCK_REPLY: &str = "✨ Demo stylist suggestion: pair your white cropped blouse with the high-waisted black jeans, \
layer the oversized beige blazer on top and finish with white sneakers for an effortless, polished look. \
Add a slim belt and small gold hoops if you want a little extra polish.\n\n_(Demo mode: no model was called.)_";

/// Stands in for the model when no credential is configured.
pub struct MockGenerator;

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _request: &ChatRequest) -> Result<String, GenerationError> {
        info!("Using demo mode - returning mock stylist reply");
        Ok(MOCK_REPLY.to_string())
    }
}

// Replaces inline base64 payloads (data URLs) in a request body so logs stay readable.
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "url" {
                    if let serde_json::Value::String(s) = val {
                        if s.starts_with("data:") && s.len() > 100 {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
    }

    async fn perform_api_call(&self, request_body: serde_json::Value) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        info!("🔗 Making request to: {}", url);

        let mut logged = request_body.clone();
        truncate_base64_in_json(&mut logged);
        info!("📤 Request body: {}", serde_json::to_string(&logged).unwrap_or_default());

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await.map_err(classify_transport_error)?;
        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(classify_status(status, response_text));
        }

        extract_reply(&response_text)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        info!("Generating text with {} (temperature {}, max_tokens {})", self.model, request.temperature, request.max_tokens);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens
        });
        self.perform_api_call(body).await
    }
}

#[async_trait]
impl Captioner for OpenAiClient {
    async fn caption(&self, instruction: &str, image: &ImagePayload) -> Result<String, CaptionError> {
        info!("🖼️ Captioning {} ({}, {}x{})", image.file_name, image.media_type.mime(), image.width, image.height);
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": instruction},
                    {"type": "image_url", "image_url": {"url": image.data_url()}}
                ]
            }],
            "max_tokens": 100
        });
        Ok(self.perform_api_call(body).await?)
    }
}

fn classify_transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else if e.is_decode() {
        GenerationError::Malformed(e.to_string())
    } else {
        GenerationError::Network(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth { status: status.as_u16(), body },
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(body),
        _ => GenerationError::Status { status: status.as_u16(), body },
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice { message: Message }

#[derive(Debug, Deserialize)]
struct Message { #[serde(default)] content: Option<String> }

fn extract_reply(response_text: &str) -> Result<String, GenerationError> {
    let parsed: ChatCompletion = serde_json::from_str(response_text)
        .map_err(|e| malformed(e, response_text))?;

    parsed
        .choices
        .into_iter()
        .find_map(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| GenerationError::Malformed("no text content found in response".into()))
}

fn malformed(e: serde_json::Error, body: &str) -> GenerationError {
    let preview: String = body.chars().take(200).collect();
    GenerationError::Malformed(format!("parse error: {}: {}", e, preview))
}

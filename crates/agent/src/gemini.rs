//! Gemini `generateContent` provider implementation.

use async_trait::async_trait;
use proto::InferenceError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::provider::{GenerateRequest, InferenceProvider};

/// Public Gemini API endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const JSON_MIME_TYPE: &str = "application/json";
/// Upstream message for an unknown model or a key without access to it.
const NOT_FOUND_MARKER: &str = "Requested entity was not found";
/// Upstream message for a rejected key.
const INVALID_KEY_MARKER: &str = "API key not valid";

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

// ── Provider ───────────────────────────────────────────────────────────────────

/// Gemini API inference provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a provider targeting the public Gemini endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, GEMINI_BASE_URL)
    }

    /// Creates a provider targeting a custom base URL (useful for proxies/tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    async fn generate(&self, req: GenerateRequest) -> Result<String, InferenceError> {
        if !self.has_key() {
            return Err(InferenceError::MissingKey);
        }

        let body = build_request(&req);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, req.model
        );
        debug!(
            model = %req.model,
            structured = req.response_schema.is_some(),
            grounded = req.grounded,
            "Sending request to Gemini"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Api(e.without_url().to_string()))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Gemini response received");
        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::Api(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }
        extract_text(&text)
    }

    fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn build_request(req: &GenerateRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(req.prompt.clone()),
            }],
        }],
        generation_config: req.response_schema.clone().map(|schema| GenerationConfig {
            response_mime_type: JSON_MIME_TYPE,
            response_schema: schema,
        }),
        tools: if req.grounded {
            vec![serde_json::json!({ "googleSearch": {} })]
        } else {
            Vec::new()
        },
    }
}

/// Maps a non-success reply to the error the probe triage understands.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> InferenceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| body.chars().take(500).collect());

    if status == StatusCode::NOT_FOUND || message.contains(NOT_FOUND_MARKER) {
        InferenceError::UpstreamNotFound(message)
    } else if status == StatusCode::BAD_REQUEST || message.contains(INVALID_KEY_MARKER) {
        InferenceError::InvalidKey(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        InferenceError::RateLimit
    } else {
        InferenceError::Api(format!("HTTP {status}: {message}"))
    }
}

fn extract_text(body: &str) -> Result<String, InferenceError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        InferenceError::InvalidResponse(format!(
            "Deserialization error: {e}; body: {}",
            body.chars().take(200).collect::<String>()
        ))
    })?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    Ok(text)
}

//! Inference provider abstraction.

use async_trait::async_trait;
use proto::InferenceError;
use serde_json::Value;

/// Model used for scenario analysis.
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-3-flash-preview";
/// Lightweight model used for the connectivity ping.
pub const DEFAULT_PROBE_MODEL: &str = "gemini-flash-lite-latest";

/// One single-turn generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Target model id.
    pub model: String,
    /// User prompt text.
    pub prompt: String,
    /// JSON schema the reply must follow. `None` asks for free text.
    pub response_schema: Option<Value>,
    /// Allow the provider to ground the answer with web search.
    pub grounded: bool,
}

impl GenerateRequest {
    /// Free-text request.
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            response_schema: None,
            grounded: false,
        }
    }

    /// Request whose reply is JSON matching `schema`.
    pub fn structured(model: impl Into<String>, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            response_schema: Some(schema),
            grounded: false,
        }
    }

    pub fn with_grounding(mut self) -> Self {
        self.grounded = true;
        self
    }
}

/// Inference provider trait
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Runs one generation and returns the reply text.
    async fn generate(&self, req: GenerateRequest) -> Result<String, InferenceError>;

    /// Whether a usable API key is present. Providers without one fail every
    /// call with [`InferenceError::MissingKey`].
    fn has_key(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_request_has_no_schema() {
        let req = GenerateRequest::text(DEFAULT_PROBE_MODEL, "ping");
        assert!(req.response_schema.is_none());
        assert!(!req.grounded);
    }

    #[test]
    fn structured_request_keeps_schema_and_grounding_flag() {
        let req = GenerateRequest::structured("m", "p", json!({"type": "OBJECT"})).with_grounding();
        assert_eq!(req.response_schema, Some(json!({"type": "OBJECT"})));
        assert!(req.grounded);
    }
}

//! Structured scenario analysis on top of an [`InferenceProvider`].

use crate::provider::{DEFAULT_ANALYSIS_MODEL, GenerateRequest, InferenceProvider};
use crate::schema;
use proto::{
    CalibrationReport, InferenceError, PowerActor, PowerDynamicsReport, PowerLink,
    ResonanceAnalysis, RiskAssessment,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs the analysis prompts and parses their structured replies.
pub struct Analyst {
    provider: Arc<dyn InferenceProvider>,
    model: String,
    timeout: Duration,
}

impl Analyst {
    pub fn new(provider: Arc<dyn InferenceProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            timeout,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Scores `scenario` on the three risk axes.
    pub async fn analyze_risk(&self, scenario: &str) -> Result<RiskAssessment, InferenceError> {
        let prompt = format!(
            "You are the Polaris OS Cognitive Engine. Analyze this scenario using the \
             \"Structural Aversion Playbook\" framework.\n\
             Focus on these specific axes:\n\
             1. Chronic Degradation\n\
             2. Irreversible Inflection\n\
             3. Judgment Sovereignty\n\
             Scenario: {scenario}"
        );
        self.run(prompt, schema::risk_assessment(), false).await
    }

    /// Third-order ripple deduction for a global event.
    pub async fn analyze_global_resonance(&self, event: &str) -> Result<ResonanceAnalysis, InferenceError> {
        let prompt = format!(
            "As the Polaris Global Intelligence Engine, analyze this global event: \"{event}\".\n\
             Perform a 3rd-order ripple deduction focusing on Geopolitical Entropy and Sovereign Risk.\n\
             Explain your reasoning path clearly."
        );
        self.run(prompt, schema::resonance_analysis(), false).await
    }

    /// Compares an earlier ripple prediction with what actually happened.
    pub async fn calibrate_protocol(
        &self,
        prediction: &ResonanceAnalysis,
        reality: &str,
    ) -> Result<CalibrationReport, InferenceError> {
        let ripples = serde_json::to_string(&prediction.ripples)
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        let prompt = format!(
            "CALIBRATION SESSION:\n\
             Original Prediction: {ripples}\n\
             Actual Outcome: \"{reality}\"\n\n\
             Tasks:\n\
             1. Identify the logic gap.\n\
             2. Extract the 'Cognitive Crystal' (a new rule for future scans).\n\
             3. Show the thinking trace of this calibration."
        );
        self.run(prompt, schema::calibration_report(), true).await
    }

    /// Instability and leverage points in an actor/relationship map.
    pub async fn analyze_power_dynamics(
        &self,
        actors: &[PowerActor],
        relationships: &[PowerLink],
    ) -> Result<PowerDynamicsReport, InferenceError> {
        let map = json!({ "actors": actors, "relationships": relationships });
        let prompt = format!("Analyze power dynamics: {map}");
        self.run(prompt, schema::power_dynamics_report(), false).await
    }

    async fn run<T: DeserializeOwned>(
        &self,
        prompt: String,
        schema: Value,
        grounded: bool,
    ) -> Result<T, InferenceError> {
        let mut req = GenerateRequest::structured(&self.model, prompt, schema);
        if grounded {
            req = req.with_grounding();
        }
        let text = tokio::time::timeout(self.timeout, self.provider.generate(req))
            .await
            .map_err(|_| InferenceError::Timeout(self.timeout))??;
        debug!(model = %self.model, chars = text.len(), "Structured reply received");
        parse_reply(&text)
    }
}

/// Parses a JSON reply, tolerating a surrounding Markdown code fence.
pub fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, InferenceError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| {
        InferenceError::InvalidResponse(format!(
            "{e}; reply: {}",
            body.chars().take(200).collect::<String>()
        ))
    })
}

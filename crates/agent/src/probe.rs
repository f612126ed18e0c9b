//! Inference round-trip probe and failure triage.

use crate::provider::{GenerateRequest, InferenceProvider};
use proto::{InferenceError, InferenceProbeReport};
use std::time::Duration;
use tracing::{info, warn};

/// Prompt sent by the probe.
pub const PROBE_PROMPT: &str = "Diagnostic Ping. Reply with 'OK'.";

const CONNECTED_MESSAGE: &str = "Connection established.";
const MISSING_KEY_MESSAGE: &str =
    "An inference API key is required. Select or enter a key to continue.";
const NOT_FOUND_MESSAGE: &str = "Error 404: the requested model was not found or this API key \
     lacks permission for it. Make sure the key belongs to a project with billing enabled, \
     then select the key again.";
const INVALID_KEY_MESSAGE: &str =
    "The API key is not valid. Check the deployment environment variables or select a new key.";

/// Sends one ping to `model` and classifies the outcome. Never fails.
///
/// Missing, not-found and invalid-key outcomes ask the caller to prompt for a
/// new key; every other failure is passed through without a reset.
pub async fn probe_inference(
    provider: &dyn InferenceProvider,
    model: &str,
    timeout: Duration,
) -> InferenceProbeReport {
    let outcome = match tokio::time::timeout(
        timeout,
        provider.generate(GenerateRequest::text(model, PROBE_PROMPT)),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(InferenceError::Timeout(timeout)),
    };

    let report = triage(outcome);
    if report.success {
        info!(model, "Inference probe succeeded");
    } else {
        warn!(
            model,
            reset = report.should_reset_credential,
            message = %report.message,
            "Inference probe failed"
        );
    }
    report
}

fn triage(outcome: Result<String, InferenceError>) -> InferenceProbeReport {
    match outcome {
        Ok(text) if text.trim().is_empty() => InferenceProbeReport::ok(CONNECTED_MESSAGE),
        Ok(text) => InferenceProbeReport::ok(text.trim()),
        Err(InferenceError::MissingKey) => InferenceProbeReport::failed(MISSING_KEY_MESSAGE, true),
        Err(InferenceError::UpstreamNotFound(_)) => {
            InferenceProbeReport::failed(NOT_FOUND_MESSAGE, true)
        }
        Err(InferenceError::InvalidKey(_)) => InferenceProbeReport::failed(INVALID_KEY_MESSAGE, true),
        Err(other) => InferenceProbeReport::failed(other.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_becomes_message() {
        let report = triage(Ok(" OK \n".to_string()));
        assert!(report.success);
        assert_eq!(report.message, "OK");
        assert!(!report.should_reset_credential);
    }

    #[test]
    fn empty_reply_still_counts_as_connected() {
        assert_eq!(triage(Ok(String::new())).message, CONNECTED_MESSAGE);
    }

    #[test]
    fn key_related_failures_request_reset() {
        for err in [
            InferenceError::MissingKey,
            InferenceError::UpstreamNotFound("Requested entity was not found.".to_string()),
            InferenceError::InvalidKey("API key not valid".to_string()),
        ] {
            let report = triage(Err(err));
            assert!(!report.success);
            assert!(report.should_reset_credential);
        }
    }

    #[test]
    fn not_found_message_is_actionable() {
        let report = triage(Err(InferenceError::UpstreamNotFound("x".to_string())));
        assert!(report.message.contains("404"));
        assert!(report.message.contains("billing"));
    }

    #[test]
    fn other_failures_pass_through_without_reset() {
        let report = triage(Err(InferenceError::Timeout(Duration::from_secs(15))));
        assert!(!report.success);
        assert!(!report.should_reset_credential);
        assert_eq!(report.message, "Inference request timed out after 15s");

        let report = triage(Err(InferenceError::Timeout(Duration::from_millis(250))));
        assert_eq!(report.message, "Inference request timed out after 250ms");

        let report = triage(Err(InferenceError::Api("HTTP 500: boom".to_string())));
        assert_eq!(report.message, "HTTP 500: boom");
        assert!(!report.should_reset_credential);
    }
}

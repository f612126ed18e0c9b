use std::time::Duration;
use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Hosted backend request error.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Inference API error.
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Session/identity resolution error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint URL is not an absolute http(s) URL.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// No usable secret was supplied or resolved.
    #[error("Missing credential: {0}")]
    CredentialMissing(String),

    /// Filesystem read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse/serialize error.
    #[error("TOML error: {0}")]
    Toml(String),

    /// Local key/value store failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Hosted backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    /// DNS/connect/transport failure.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Credentials rejected by a reachable endpoint (401/403 or row-level security).
    #[error("Unauthorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Any other non-success HTTP status.
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    /// Request did not finish within the allotted time.
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// Returns `true` when the endpoint answered but refused the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Inference API errors
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No usable inference API key was resolved.
    #[error("Inference API key is missing")]
    MissingKey,

    /// Requested model/entity was not found for this key (404).
    #[error("{0}")]
    UpstreamNotFound(String),

    /// Key rejected as invalid (400 "API key not valid").
    #[error("{0}")]
    InvalidKey(String),

    /// Any other remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from inference API: {0}")]
    InvalidResponse(String),

    /// Request did not finish within the allotted time.
    #[error("Inference request timed out after {0:?}")]
    Timeout(Duration),
}

/// Session errors. Never surfaced past the session gate as a blocking state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No backend is configured, so there is no session to resolve.
    #[error("Backend is not configured")]
    NotConfigured,

    /// Reading the current session failed.
    #[error("Session resolution failed: {0}")]
    ResolutionFailed(String),

    /// Sign-in was rejected or could not complete.
    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    /// Persisting or removing a local session failed.
    #[error("Session storage failed: {0}")]
    Storage(#[from] ConfigError),
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        Self::ResolutionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_invalid_endpoint() {
        let err = ConfigError::InvalidEndpoint {
            url: "ftp://bad".to_string(),
            reason: "scheme must be http or https".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Invalid endpoint"));
        assert!(text.contains("ftp://bad"));
    }

    #[test]
    fn wraps_config_error_into_top_level_error() {
        let err: Error = ConfigError::CredentialMissing("secret key".to_string()).into();
        assert!(err.to_string().contains("Config error"));
    }

    #[test]
    fn wraps_backend_and_inference_errors() {
        let backend: Error = BackendError::Timeout(Duration::from_secs(8)).into();
        assert!(backend.to_string().contains("Backend error"));
        assert!(backend.to_string().ends_with("after 8s"));

        let inference: Error = InferenceError::MissingKey.into();
        assert!(inference.to_string().contains("Inference error"));
    }

    #[test]
    fn unauthorized_is_detected() {
        let err = BackendError::Unauthorized {
            status: 401,
            message: "JWT expired".to_string(),
        };
        assert!(err.is_unauthorized());
        assert!(!BackendError::Unreachable("dns".to_string()).is_unauthorized());
    }

    #[test]
    fn backend_error_converts_to_session_resolution_failure() {
        let err: SessionError = BackendError::Unreachable("connection refused".to_string()).into();
        assert!(matches!(err, SessionError::ResolutionFailed(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn config_error_converts_to_session_storage_failure() {
        let err: SessionError = ConfigError::Storage("disk full".to_string()).into();
        assert!(matches!(err, SessionError::Storage(_)));
        assert!(err.to_string().contains("disk full"));
    }
}

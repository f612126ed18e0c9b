use serde::{Deserialize, Serialize};

/// Backend endpoint and its access key, always handled as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Absolute http(s) URL of the hosted backend, or empty.
    pub endpoint_url: String,
    /// Opaque access key for the backend, or empty.
    pub secret_key: String,
}

impl CredentialPair {
    /// Creates a pair from raw input, trimming surrounding whitespace.
    pub fn new(endpoint_url: impl AsRef<str>, secret_key: impl AsRef<str>) -> Self {
        Self {
            endpoint_url: endpoint_url.as_ref().trim().to_string(),
            secret_key: secret_key.as_ref().trim().to_string(),
        }
    }

    /// Returns `true` when neither field carries a value.
    pub fn is_empty(&self) -> bool {
        self.endpoint_url.is_empty() && self.secret_key.is_empty()
    }

    /// Returns `true` iff the endpoint is non-empty, starts with `http`, and a key is present.
    pub fn is_configured(&self) -> bool {
        !self.endpoint_url.is_empty()
            && self.endpoint_url.starts_with("http")
            && !self.secret_key.is_empty()
    }

    /// Returns the key with everything but a short prefix hidden, for display.
    pub fn masked_key(&self) -> String {
        mask_secret(&self.secret_key)
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Obfuscated entry in the local store.
    Cached,
    /// Process environment.
    Environment,
    /// Built-in fallback constant.
    Fallback,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Environment => "environment",
            Self::Fallback => "fallback",
        }
    }
}

/// Effective configuration for one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub pair: CredentialPair,
    pub source: ConfigSource,
}

impl ResolvedConfig {
    pub fn is_configured(&self) -> bool {
        self.pair.is_configured()
    }
}

/// Masks a secret for logs and status output (`abcd…` + length).
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(none)".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}… ({} chars)", secret.chars().count())
}

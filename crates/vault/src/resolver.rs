//! Effective-configuration resolution.
//!
//! Priority for the backend pair and the inference key alike:
//! 1. Obfuscated entry cached in the local store (if every stored token decodes)
//! 2. Environment variables, under several platform naming variants
//! 3. Built-in fallback (empty, i.e. "not configured")
//!
//! The backend pair is taken from exactly one source; a cached URL is never
//! combined with an environment key.

use crate::codec::Codec;
use crate::env::{BACKEND_KEY_VARS, BACKEND_URL_VARS, EnvSource, INFERENCE_KEY_VARS};
use crate::store::{ENDPOINT_URL_KEY, INFERENCE_KEY_KEY, KeyValueStore, SECRET_KEY_KEY};
use proto::{ConfigError, ConfigSource, CredentialPair, ResolvedConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Built-in fallback endpoint. Empty means "not configured".
pub const FALLBACK_ENDPOINT_URL: &str = "";
/// Built-in fallback backend key.
pub const FALLBACK_SECRET_KEY: &str = "";

/// Inference keys shorter than this are treated as placeholders.
const MIN_INFERENCE_KEY_LEN: usize = 10;

/// Inference API key together with the source it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub source: ConfigSource,
}

impl ResolvedKey {
    pub fn is_present(&self) -> bool {
        !self.key.is_empty()
    }
}

/// Resolves, persists, and clears cached credentials.
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn KeyValueStore>,
    env: Arc<dyn EnvSource>,
    codec: Codec,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, env: Arc<dyn EnvSource>, codec: Codec) -> Self {
        Self { store, env, codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Computes the effective backend pair. Re-reads every source on each call.
    pub fn resolve(&self) -> ResolvedConfig {
        if let Some(cached) = self.cached_pair() {
            debug!(source = "cached", "Backend config resolved");
            return ResolvedConfig {
                pair: cached,
                source: ConfigSource::Cached,
            };
        }

        let url = self.env.lookup_any(BACKEND_URL_VARS);
        let key = self.env.lookup_any(BACKEND_KEY_VARS);
        if url.is_some() || key.is_some() {
            debug!(
                source = "env",
                url_var = ?url.as_ref().map(|(name, _)| name),
                key_var = ?key.as_ref().map(|(name, _)| name),
                "Backend config resolved"
            );
            return ResolvedConfig {
                pair: CredentialPair::new(
                    url.map(|(_, v)| v).unwrap_or_default(),
                    key.map(|(_, v)| v).unwrap_or_default(),
                ),
                source: ConfigSource::Environment,
            };
        }

        debug!(source = "fallback", "No backend config found from any source");
        ResolvedConfig {
            pair: CredentialPair::new(FALLBACK_ENDPOINT_URL, FALLBACK_SECRET_KEY),
            source: ConfigSource::Fallback,
        }
    }

    /// Cached pair, provided every stored token decodes to a value.
    ///
    /// An absent token reads as empty; a present one that does not decode
    /// disqualifies the whole cached pair.
    fn cached_pair(&self) -> Option<CredentialPair> {
        let decode = |name: &str| match self.store.get(name) {
            None => Some(String::new()),
            Some(token) => {
                let value = self.codec.decode(&token);
                if value.trim().is_empty() {
                    debug!(entry = name, "Ignoring undecodable cached entry");
                    None
                } else {
                    Some(value)
                }
            }
        };
        let pair = CredentialPair::new(decode(ENDPOINT_URL_KEY)?, decode(SECRET_KEY_KEY)?);
        (!pair.is_empty()).then_some(pair)
    }

    /// Whether backend-dependent features may run. Never cached.
    pub fn is_configured(&self) -> bool {
        self.resolve().is_configured()
    }

    /// Validates and persists a new backend pair, replacing the cached one wholesale.
    ///
    /// Nothing is written when validation fails.
    pub fn update(&self, endpoint_url: &str, secret_key: &str) -> Result<CredentialPair, ConfigError> {
        let pair = CredentialPair::new(endpoint_url, secret_key);
        validate_endpoint(&pair.endpoint_url)?;
        if pair.secret_key.is_empty() {
            return Err(ConfigError::CredentialMissing(
                "backend secret key is empty".to_string(),
            ));
        }

        let previous_url = self.store.get(ENDPOINT_URL_KEY);
        self.store
            .set(ENDPOINT_URL_KEY, &self.codec.encode(&pair.endpoint_url))?;
        if let Err(e) = self
            .store
            .set(SECRET_KEY_KEY, &self.codec.encode(&pair.secret_key))
        {
            // Keep the stored pair consistent with itself.
            let _ = match previous_url {
                Some(old) => self.store.set(ENDPOINT_URL_KEY, &old),
                None => self.store.remove(ENDPOINT_URL_KEY),
            };
            return Err(e);
        }

        info!(endpoint = %pair.endpoint_url, key = %pair.masked_key(), "Backend config saved");
        Ok(pair)
    }

    /// Removes the cached backend pair so environment/fallback apply again.
    pub fn clear(&self) -> Result<(), ConfigError> {
        self.store.remove(ENDPOINT_URL_KEY)?;
        self.store.remove(SECRET_KEY_KEY)?;
        info!("Cached backend config cleared");
        Ok(())
    }

    /// Resolves the inference API key, ignoring known placeholder values.
    pub fn resolve_inference_key(&self) -> ResolvedKey {
        let cached = self
            .codec
            .decode_opt(self.store.get(INFERENCE_KEY_KEY).as_deref());
        let cached = cached.trim();
        if !is_placeholder_key(cached) {
            debug!(source = "cached", "Inference key resolved");
            return ResolvedKey {
                key: cached.to_string(),
                source: ConfigSource::Cached,
            };
        }

        if let Some((name, value)) = self.env.lookup_any(INFERENCE_KEY_VARS) {
            if !is_placeholder_key(&value) {
                debug!(source = "env", env_var = %name, "Inference key resolved");
                return ResolvedKey {
                    key: value,
                    source: ConfigSource::Environment,
                };
            }
            debug!(env_var = %name, "Ignoring placeholder inference key");
        }

        debug!("No inference key found from any source");
        ResolvedKey {
            key: String::new(),
            source: ConfigSource::Fallback,
        }
    }

    /// Caches an inference key obfuscated in the local store.
    pub fn set_inference_key(&self, key: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if is_placeholder_key(key) {
            return Err(ConfigError::CredentialMissing(
                "inference key is empty or a placeholder".to_string(),
            ));
        }
        self.store
            .set(INFERENCE_KEY_KEY, &self.codec.encode(key))?;
        info!(key = %proto::mask_secret(key), "Inference key saved");
        Ok(())
    }

    /// Drops the cached inference key, e.g. after the API rejected it.
    pub fn clear_inference_key(&self) -> Result<(), ConfigError> {
        self.store.remove(INFERENCE_KEY_KEY)?;
        info!("Cached inference key cleared");
        Ok(())
    }
}

/// Requires an absolute `http`/`https` URL with a host.
pub fn validate_endpoint(endpoint_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        url: endpoint_url.to_string(),
        reason: reason.to_string(),
    };
    if !endpoint_url.starts_with("http") {
        return Err(invalid("must start with http:// or https://"));
    }
    let parsed = url::Url::parse(endpoint_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

/// Returns `true` for empty keys and the stand-ins deployment templates ship with.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    key.is_empty()
        || key == "undefined"
        || key == "null"
        || key == "PLACEHOLDER_API_KEY"
        || key.contains("YOUR_API_KEY")
        || key.chars().count() < MIN_INFERENCE_KEY_LEN
}

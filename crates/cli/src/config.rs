use agent::{DEFAULT_ANALYSIS_MODEL, DEFAULT_PROBE_MODEL, GEMINI_BASE_URL};
use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use vault::{Codec, FileStore};

/// Local store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store file. Defaults to `~/.polaris/storage.toml`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Obfuscation applied to cached secrets.
    #[serde(default)]
    pub codec: Codec,
}

impl StorageConfig {
    pub fn effective_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(FileStore::default_path)
    }
}

/// Inference API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model used by `scan` and `resonance`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model pinged by `diagnose`.
    #[serde(default = "default_probe_model")]
    pub probe_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            probe_model: default_probe_model(),
            base_url: default_base_url(),
        }
    }
}

/// Upper bounds for network operations, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_backend_probe_secs")]
    pub backend_probe_secs: u64,
    #[serde(default = "default_inference_probe_secs")]
    pub inference_probe_secs: u64,
    #[serde(default = "default_session_secs")]
    pub session_secs: u64,
    #[serde(default = "default_analysis_secs")]
    pub analysis_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            backend_probe_secs: default_backend_probe_secs(),
            inference_probe_secs: default_inference_probe_secs(),
            session_secs: default_session_secs(),
            analysis_secs: default_analysis_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn backend_probe(&self) -> Duration {
        Duration::from_secs(self.backend_probe_secs.max(1))
    }

    pub fn inference_probe(&self) -> Duration {
        Duration::from_secs(self.inference_probe_secs.max(1))
    }

    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs.max(1))
    }

    pub fn analysis(&self) -> Duration {
        Duration::from_secs(self.analysis_secs.max(1))
    }
}

fn default_model() -> String {
    DEFAULT_ANALYSIS_MODEL.to_string()
}

fn default_probe_model() -> String {
    DEFAULT_PROBE_MODEL.to_string()
}

fn default_base_url() -> String {
    GEMINI_BASE_URL.to_string()
}

fn default_backend_probe_secs() -> u64 {
    8
}

fn default_inference_probe_secs() -> u64 {
    15
}

fn default_session_secs() -> u64 {
    8
}

fn default_analysis_secs() -> u64 {
    60
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Loads configuration from an explicit path, `./polaris.toml`, or
    /// `~/.polaris/config.toml`, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            let cwd = std::env::current_dir().ok()?.join("polaris.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home = std::env::var("HOME").ok()?;
            let home_config = PathBuf::from(home).join(".polaris").join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        if let Ok(path) = std::env::var("POLARIS_STORAGE_PATH")
            && !path.trim().is_empty()
        {
            config.storage.path = Some(PathBuf::from(path.trim()));
        }
        if let Ok(codec) = std::env::var("POLARIS_CODEC") {
            match codec.parse::<Codec>() {
                Ok(codec) => config.storage.codec = codec,
                Err(e) => warn!(error = %e, "Ignoring POLARIS_CODEC"),
            }
        }
        if let Ok(model) = std::env::var("POLARIS_MODEL")
            && !model.trim().is_empty()
        {
            config.inference.model = model.trim().to_string();
        }

        debug!(
            storage = %config.storage.effective_path().display(),
            codec = config.storage.codec.name(),
            model = %config.inference.model,
            "Config loaded"
        );
        Ok(config)
    }
}

//! Local key/value storage for cached configuration and session state.

use parking_lot::Mutex;
use proto::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Versioned key for the obfuscated backend endpoint.
pub const ENDPOINT_URL_KEY: &str = "polaris_vault_v3_url";
/// Versioned key for the obfuscated backend secret.
pub const SECRET_KEY_KEY: &str = "polaris_vault_v3_key";
/// Versioned key for the obfuscated inference API key.
pub const INFERENCE_KEY_KEY: &str = "polaris_vault_v3_inference_key";
/// Versioned key for the persisted backend session.
pub const SESSION_KEY: &str = "polaris_session_v3";
/// Versioned key for the profile signed in through the identity provider.
pub const IDENTITY_SESSION_KEY: &str = "polaris_idp_session_v3";

/// String-to-string store with local-storage semantics.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Deletes `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), ConfigError>;
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a flat TOML table on disk (`~/.polaris/storage.toml`).
///
/// Every write rewrites the whole file. Reads go through an in-memory copy
/// loaded once at open time, so values written by another process are only
/// seen after reopening.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Default storage path under the user's home directory.
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".polaris").join("storage.toml")
    }

    /// Opens the store at `path`. A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        trace!(path = %path.display(), entries = entries.len(), "Local store opened");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(entries).map_err(|e| ConfigError::Toml(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Local store saved");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let mut entries = self.entries.lock();
        if let Some(old) = entries.remove(key)
            && let Err(e) = self.persist(&entries)
        {
            entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Local store is corrupt, starting empty");
            BTreeMap::new()
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Local store unreadable, starting empty");
            BTreeMap::new()
        }
    }
}

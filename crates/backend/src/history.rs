//! Saved scan results: the backend `scans` collection for signed-in users,
//! the local store otherwise.

use crate::hub::BackendHub;
use crate::probe::PROBE_COLLECTION;
use proto::{BackendError, ConfigError, Identity, ScanRecord};
use std::sync::Arc;
use tracing::{debug, info};

/// Local-store key for scans kept on this machine.
pub const LOCAL_SCANS_KEY: &str = "polaris_scans_v3";
/// Local history is capped to the newest entries.
const LOCAL_HISTORY_LIMIT: usize = 50;
/// Owner id for rows saved while not signed in.
const LOCAL_OWNER: &str = "local";

/// Where a scan ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedTo {
    Backend,
    Local,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct ScanHistory {
    hub: Arc<BackendHub>,
}

impl ScanHistory {
    pub fn new(hub: Arc<BackendHub>) -> Self {
        Self { hub }
    }

    /// Saves `record` remotely when the backend is configured and the user is
    /// signed in, locally otherwise.
    pub async fn save(&self, identity: &Identity, mut record: ScanRecord) -> Result<SavedTo, HistoryError> {
        match (self.hub.is_configured(), identity.user_id()) {
            (true, Some(user_id)) => {
                record.user_id = user_id.to_string();
                let token = self.hub.stored_session().map(|s| s.access_token);
                self.hub
                    .client()
                    .insert_scan(PROBE_COLLECTION, &record, token.as_deref())
                    .await?;
                info!(id = %record.id, "Scan saved to backend");
                Ok(SavedTo::Backend)
            }
            _ => {
                record.user_id = LOCAL_OWNER.to_string();
                let mut scans = self.local();
                scans.insert(0, record);
                scans.truncate(LOCAL_HISTORY_LIMIT);
                let raw = serde_json::to_string(&scans)
                    .map_err(|e| ConfigError::Storage(e.to_string()))?;
                self.hub.resolver().store().set(LOCAL_SCANS_KEY, &raw)?;
                info!(count = scans.len(), "Scan saved locally");
                Ok(SavedTo::Local)
            }
        }
    }

    /// Newest-first scans visible to `identity`.
    pub async fn list(&self, identity: &Identity, limit: u32) -> Result<Vec<ScanRecord>, HistoryError> {
        match (self.hub.is_configured(), identity.user_id()) {
            (true, Some(user_id)) => {
                let token = self.hub.stored_session().map(|s| s.access_token);
                let rows = self
                    .hub
                    .client()
                    .list_scans(PROBE_COLLECTION, user_id, token.as_deref(), limit)
                    .await?;
                debug!(rows = rows.len(), "Loaded scans from backend");
                Ok(rows)
            }
            _ => {
                let mut scans = self.local();
                scans.truncate(limit as usize);
                Ok(scans)
            }
        }
    }

    fn local(&self) -> Vec<ScanRecord> {
        self.hub
            .resolver()
            .store()
            .get(LOCAL_SCANS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

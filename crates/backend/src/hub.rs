//! Backend composition root: resolver, live client, and auth events.

use crate::client::{BackendClient, StoredSession};
use crate::probe::{probe_backend, probe_backend_state};
use crate::session::AuthEvent;
use parking_lot::Mutex;
use proto::{ConfigError, ConnectivityState, CredentialPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use vault::store::SESSION_KEY;
use vault::{ConfigResolver, ConnectionRegistry};

const AUTH_EVENT_CAPACITY: usize = 16;

/// Composition root for everything that talks to the backend.
///
/// Owns the resolver, the live client registry, and the auth event channel,
/// so a config update swaps the handle and notifies session listeners in one
/// place.
pub struct BackendHub {
    resolver: ConfigResolver,
    registry: ConnectionRegistry<BackendClient>,
    events: broadcast::Sender<AuthEvent>,
    probe_timeout: Duration,
    /// Held across a config write and the matching handle swap.
    config_write: Mutex<()>,
}

impl BackendHub {
    /// Builds the hub with a client for the currently resolved config.
    pub fn new(resolver: ConfigResolver, probe_timeout: Duration) -> Arc<Self> {
        let resolved = resolver.resolve();
        debug!(
            source = resolved.source.as_str(),
            configured = resolved.is_configured(),
            "Backend hub initialised"
        );
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Arc::new(Self {
            registry: ConnectionRegistry::new(BackendClient::new(resolved.pair)),
            resolver,
            events,
            probe_timeout,
            config_write: Mutex::new(()),
        })
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Client for a new request.
    pub fn client(&self) -> Arc<BackendClient> {
        self.registry.current()
    }

    pub fn registry(&self) -> &ConnectionRegistry<BackendClient> {
        &self.registry
    }

    /// Re-derived from the resolver on every call.
    pub fn is_configured(&self) -> bool {
        self.resolver.is_configured()
    }

    /// Validates and saves a new pair, then swaps the live client to it.
    pub fn update_config(&self, endpoint_url: &str, secret_key: &str) -> Result<CredentialPair, ConfigError> {
        let guard = self.config_write.lock();
        let pair = self.resolver.update(endpoint_url, secret_key)?;
        self.registry.replace(BackendClient::new(pair.clone()));
        drop(guard);
        self.notify(AuthEvent::SessionRefreshed);
        Ok(pair)
    }

    /// Drops the cached pair and swaps to whatever the remaining sources resolve to.
    pub fn clear_config(&self) -> Result<(), ConfigError> {
        let guard = self.config_write.lock();
        self.resolver.clear()?;
        self.registry
            .replace(BackendClient::new(self.resolver.resolve().pair));
        drop(guard);
        self.notify(AuthEvent::SessionRefreshed);
        Ok(())
    }

    pub async fn probe(&self) -> bool {
        probe_backend(&self.client(), self.probe_timeout).await
    }

    pub async fn probe_state(&self) -> ConnectivityState {
        probe_backend_state(&self.client(), self.probe_timeout).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Number of live auth-event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub(crate) fn notify(&self, event: AuthEvent) {
        // No receivers is fine: nobody is watching the session yet.
        let _ = self.events.send(event);
    }

    /// Persisted backend session, if one decodes.
    pub fn stored_session(&self) -> Option<StoredSession> {
        let raw = self.resolver.store().get(SESSION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                None
            }
        }
    }

    pub(crate) fn save_session(&self, session: &StoredSession) -> Result<(), ConfigError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| ConfigError::Storage(e.to_string()))?;
        self.resolver.store().set(SESSION_KEY, &raw)
    }

    /// Removes the persisted backend session, locally only.
    pub fn forget_session(&self) -> Result<(), ConfigError> {
        self.resolver.store().remove(SESSION_KEY)
    }
}

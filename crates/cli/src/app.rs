//! Composition root shared by every subcommand.

use crate::config::Config;
use agent::{Analyst, GeminiProvider, InferenceProvider, probe_inference};
use backend::{
    BackendHub, BackendSessionSource, MockIdentityProvider, ScanHistory, SessionGate,
    SessionSource, SignInRequest,
};
use proto::{ConfigError, ConnectivityState, Identity, InferenceProbeReport, SessionError};
use std::sync::Arc;
use tracing::{debug, info};
use vault::{ConfigResolver, EnvSource, FileStore, KeyValueStore, ProcessEnv, ResolvedKey};

/// Result of `diagnose`: both probes, run together.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub backend: ConnectivityState,
    pub inference: InferenceProbeReport,
}

pub struct App {
    config: Config,
    hub: Arc<BackendHub>,
    mock_identity: Arc<MockIdentityProvider>,
}

impl App {
    /// Opens the file store from `config` and reads the process environment.
    pub fn open(config: Config) -> Self {
        let store = FileStore::open(config.storage.effective_path());
        Self::new(config, Arc::new(store), Arc::new(ProcessEnv))
    }

    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, env: Arc<dyn EnvSource>) -> Self {
        let resolver = ConfigResolver::new(store.clone(), env, config.storage.codec);
        let hub = BackendHub::new(resolver, config.timeouts.backend_probe());
        Self {
            config,
            hub,
            mock_identity: Arc::new(MockIdentityProvider::default().with_store(store)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &Arc<BackendHub> {
        &self.hub
    }

    pub fn resolver(&self) -> &ConfigResolver {
        self.hub.resolver()
    }

    /// The identity provider when no backend is configured or it holds the
    /// current session.
    fn uses_identity_provider(&self) -> bool {
        !self.hub.is_configured() || self.mock_identity.has_session()
    }

    pub fn session_source(&self) -> Arc<dyn SessionSource> {
        if self.uses_identity_provider() {
            self.mock_identity.clone()
        } else {
            Arc::new(BackendSessionSource::new(self.hub.clone()))
        }
    }

    /// Gate over the active session source, initial state settled.
    pub async fn session_gate(&self) -> SessionGate {
        if self.uses_identity_provider() {
            self.identity_provider_gate().await
        } else {
            self.backend_gate().await
        }
    }

    /// Gate over the mocked identity provider, whatever the backend config.
    ///
    /// Its session is local, so it is read even without a backend.
    pub async fn identity_provider_gate(&self) -> SessionGate {
        self.settled_gate(self.mock_identity.clone(), true).await
    }

    /// Gate over backend-managed sessions.
    pub async fn backend_gate(&self) -> SessionGate {
        let source = Arc::new(BackendSessionSource::new(self.hub.clone()));
        self.settled_gate(source, self.hub.is_configured()).await
    }

    /// Signs in and makes the new session the only stored one.
    pub async fn sign_in(
        &self,
        request: &SignInRequest,
        via_identity_provider: bool,
    ) -> Result<Identity, SessionError> {
        if via_identity_provider {
            let identity = self.identity_provider_gate().await.sign_in(request).await?;
            self.hub.forget_session()?;
            return Ok(identity);
        }
        let identity = self.backend_gate().await.sign_in(request).await?;
        self.mock_identity.forget()?;
        Ok(identity)
    }

    /// Signs out of the active source. Always ends as guest.
    pub async fn sign_out(&self) {
        self.session_gate().await.sign_out().await;
    }

    /// Forgets every stored session so later runs start as guest.
    pub fn continue_as_guest(&self) -> Result<(), SessionError> {
        self.mock_identity.forget()?;
        self.hub.forget_session()?;
        info!("Continuing as guest");
        Ok(())
    }

    async fn settled_gate(&self, source: Arc<dyn SessionSource>, configured: bool) -> SessionGate {
        let gate = SessionGate::new(source, self.config.timeouts.session());
        let state = gate.start(configured).await;
        debug!(state = ?state, "Session gate settled");
        gate
    }

    pub async fn identity(&self) -> Identity {
        self.session_gate()
            .await
            .state()
            .identity()
            .unwrap_or(Identity::Guest)
    }

    pub fn inference_key(&self) -> ResolvedKey {
        self.resolver().resolve_inference_key()
    }

    pub fn inference_provider(&self) -> Arc<dyn InferenceProvider> {
        Arc::new(GeminiProvider::with_base_url(
            self.inference_key().key,
            self.config.inference.base_url.clone(),
        ))
    }

    pub fn analyst(&self) -> Analyst {
        Analyst::new(self.inference_provider(), self.config.timeouts.analysis())
            .with_model(self.config.inference.model.clone())
    }

    pub fn history(&self) -> ScanHistory {
        ScanHistory::new(self.hub.clone())
    }

    pub async fn probe_inference(&self) -> InferenceProbeReport {
        let provider = self.inference_provider();
        probe_inference(
            provider.as_ref(),
            &self.config.inference.probe_model,
            self.config.timeouts.inference_probe(),
        )
        .await
    }

    /// Runs the backend and inference probes concurrently.
    pub async fn diagnose(&self) -> Diagnosis {
        let (backend, inference) = tokio::join!(self.hub.probe_state(), self.probe_inference());
        Diagnosis { backend, inference }
    }

    /// Drops the cached inference key when a probe asked for a new one.
    ///
    /// Returns whether a reset happened.
    pub fn apply_inference_reset(&self, report: &InferenceProbeReport) -> Result<bool, ConfigError> {
        if !report.should_reset_credential {
            return Ok(false);
        }
        self.resolver().clear_inference_key()?;
        info!("Inference key reset after failed probe");
        Ok(true)
    }
}

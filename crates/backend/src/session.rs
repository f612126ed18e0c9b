//! Session/identity gate.
//!
//! # States
//! `Loading` → `Authenticated(profile)` | `Guest`, then `Authenticated` ↔ `Guest`
//! through sign-in and sign-out. Nothing in here ever ends in an error state:
//! every failure to establish a session settles on `Guest`.

use crate::hub::BackendHub;
use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{Identity, Role, SessionError, UserProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vault::KeyValueStore;
use vault::store::IDENTITY_SESSION_KEY;

/// Session-change notification from a session source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserProfile),
    SignedOut,
    /// Something changed (new backend config, token refresh); re-read the session.
    SessionRefreshed,
}

/// Observable gate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Authenticated(UserProfile),
    Guest,
}

impl SessionState {
    /// Settled identity, or `None` while loading.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Self::Loading => None,
            Self::Authenticated(profile) => Some(Identity::Authenticated(profile.clone())),
            Self::Guest => Some(Identity::Guest),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// How a user proves who they are.
#[derive(Debug, Clone)]
pub enum SignInRequest {
    Password { email: String, password: String },
    /// Credential issued by an external identity provider.
    IdentityToken(String),
}

/// Where sessions come from.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Existing session's user, `None` when signed out.
    async fn current_user(&self) -> Result<Option<UserProfile>, SessionError>;

    async fn sign_in(&self, request: &SignInRequest) -> Result<UserProfile, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;

    /// Session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

// ── Backend-managed sessions ──────────────────────────────────────────────────

/// Sessions managed by the hosted backend's auth API, persisted in the local store.
pub struct BackendSessionSource {
    hub: Arc<BackendHub>,
}

impl BackendSessionSource {
    pub fn new(hub: Arc<BackendHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl SessionSource for BackendSessionSource {
    async fn current_user(&self) -> Result<Option<UserProfile>, SessionError> {
        let client = self.hub.client();
        if !client.is_configured() {
            return Err(SessionError::NotConfigured);
        }
        let Some(session) = self.hub.stored_session() else {
            return Ok(None);
        };
        if session.is_expired() {
            debug!("Stored session expired");
            return Ok(None);
        }
        let profile = client.fetch_user(&session.access_token).await?;
        Ok(Some(profile))
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<UserProfile, SessionError> {
        let SignInRequest::Password { email, password } = request else {
            return Err(SessionError::SignInFailed(
                "backend sign-in needs an email and password".to_string(),
            ));
        };
        let client = self.hub.client();
        if !client.is_configured() {
            return Err(SessionError::NotConfigured);
        }
        let (session, profile) = client
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| SessionError::SignInFailed(e.to_string()))?;
        self.hub
            .save_session(&session)
            .map_err(|e| SessionError::SignInFailed(e.to_string()))?;
        self.hub.notify(AuthEvent::SignedIn(profile.clone()));
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let session = self.hub.stored_session();
        if let Err(e) = self.hub.forget_session() {
            warn!(error = %e, "Failed to remove stored session");
        }
        self.hub.notify(AuthEvent::SignedOut);
        match session {
            Some(session) => self
                .hub
                .client()
                .sign_out(&session.access_token)
                .await
                .map_err(SessionError::from),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.hub.subscribe()
    }
}

// ── Mocked identity provider ──────────────────────────────────────────────────

/// Stand-in for an external identity provider: any token signs in the same
/// fixed profile after a short delay.
///
/// The session lives in memory unless a store is attached with
/// [`MockIdentityProvider::with_store`], in which case it survives restarts.
pub struct MockIdentityProvider {
    delay: Duration,
    signed_in: Mutex<Option<UserProfile>>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MockIdentityProvider {
    pub fn new(delay: Duration) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            delay,
            signed_in: Mutex::new(None),
            store: None,
            events,
        }
    }

    /// Persists the signed-in profile in `store`.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Signed-in profile, if any.
    pub fn session(&self) -> Option<UserProfile> {
        let Some(store) = &self.store else {
            return self.signed_in.lock().clone();
        };
        let raw = store.get(IDENTITY_SESSION_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable identity provider session");
                None
            }
        }
    }

    pub fn has_session(&self) -> bool {
        self.session().is_some()
    }

    /// Drops the session without notifying listeners.
    pub fn forget(&self) -> Result<(), SessionError> {
        self.signed_in.lock().take();
        if let Some(store) = &self.store {
            store.remove(IDENTITY_SESSION_KEY)?;
        }
        Ok(())
    }

    fn remember(&self, profile: &UserProfile) -> Result<(), SessionError> {
        if let Some(store) = &self.store {
            let raw = serde_json::to_string(profile)
                .map_err(|e| SessionError::SignInFailed(e.to_string()))?;
            store.set(IDENTITY_SESSION_KEY, &raw)?;
        }
        *self.signed_in.lock() = Some(profile.clone());
        Ok(())
    }

    /// Profile every successful sign-in resolves to.
    pub fn profile() -> UserProfile {
        UserProfile {
            id: "idp-strategic-agent".to_string(),
            display_name: "Strategic Agent".to_string(),
            email: "agent@polaris.os".to_string(),
            avatar_url: "https://api.dicebear.com/7.x/avataaars/svg?seed=Polaris".to_string(),
            role: Role::Executive,
        }
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(800))
    }
}

#[async_trait]
impl SessionSource for MockIdentityProvider {
    async fn current_user(&self) -> Result<Option<UserProfile>, SessionError> {
        Ok(self.session())
    }

    async fn sign_in(&self, request: &SignInRequest) -> Result<UserProfile, SessionError> {
        if let SignInRequest::IdentityToken(token) = request
            && token.trim().is_empty()
        {
            return Err(SessionError::SignInFailed("empty identity token".to_string()));
        }
        tokio::time::sleep(self.delay).await;
        let profile = Self::profile();
        self.remember(&profile)?;
        let _ = self.events.send(AuthEvent::SignedIn(profile.clone()));
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let forgotten = self.forget();
        let _ = self.events.send(AuthEvent::SignedOut);
        forgotten
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Resolves and tracks who is using the application.
///
/// The state is published on a `watch` channel; dropping a receiver from
/// [`SessionGate::subscribe`] unsubscribes. The gate's own listener on the
/// source's events is released by [`SessionGate::shutdown`] or on drop.
pub struct SessionGate {
    source: Arc<dyn SessionSource>,
    state: Arc<watch::Sender<SessionState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl SessionGate {
    /// Creates a gate in the `Loading` state.
    pub fn new(source: Arc<dyn SessionSource>, timeout: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            source,
            state: Arc::new(state),
            listener: Mutex::new(None),
            timeout,
        }
    }

    /// Settles the initial state.
    ///
    /// Without a configured backend this goes straight to `Guest` and makes no
    /// call. Otherwise it reads the existing session and starts listening for
    /// session changes.
    pub async fn start(&self, configured: bool) -> SessionState {
        self.shutdown();
        if !configured {
            debug!("Session gate: backend not configured, continuing as guest");
            apply(&self.state, SessionState::Guest);
            return self.state();
        }

        // Subscribe before reading so no change between the two is lost.
        let events = self.source.subscribe();
        let initial = resolve(self.source.as_ref(), self.timeout).await;
        apply(&self.state, initial);

        let handle = tokio::spawn(listen(
            events,
            self.source.clone(),
            self.state.clone(),
            self.timeout,
        ));
        *self.listener.lock() = Some(handle);
        self.state()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Signs in through the source. Failure leaves the current state as is.
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<Identity, SessionError> {
        let profile = match tokio::time::timeout(self.timeout, self.source.sign_in(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SessionError::SignInFailed(format!(
                    "timed out after {:?}",
                    self.timeout
                )));
            }
        };
        info!(user = %profile.id, role = %profile.role, "Signed in");
        apply(&self.state, SessionState::Authenticated(profile.clone()));
        Ok(Identity::Authenticated(profile))
    }

    /// Explicitly continues without an account.
    pub fn continue_as_guest(&self) {
        apply(&self.state, SessionState::Guest);
    }

    /// Signs out. Always ends in `Guest`, even if the remote call fails.
    pub async fn sign_out(&self) {
        match tokio::time::timeout(self.timeout, self.source.sign_out()).await {
            Ok(Ok(())) => debug!("Remote sign-out completed"),
            Ok(Err(e)) => warn!(error = %e, "Remote sign-out failed, clearing local session anyway"),
            Err(_) => warn!("Remote sign-out timed out, clearing local session anyway"),
        }
        apply(&self.state, SessionState::Guest);
    }

    /// Stops listening for session changes.
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
            debug!("Session listener released");
        }
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Publishes `next` unless it equals the current state.
fn apply(state: &watch::Sender<SessionState>, next: SessionState) -> bool {
    state.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    })
}

async fn resolve(source: &dyn SessionSource, timeout: Duration) -> SessionState {
    match tokio::time::timeout(timeout, source.current_user()).await {
        Ok(Ok(Some(profile))) => SessionState::Authenticated(profile),
        Ok(Ok(None)) => SessionState::Guest,
        Ok(Err(e)) => {
            debug!(error = %e, "Session resolution failed, continuing as guest");
            SessionState::Guest
        }
        Err(_) => {
            warn!(timeout = ?timeout, "Session resolution timed out, continuing as guest");
            SessionState::Guest
        }
    }
}

async fn listen(
    mut events: broadcast::Receiver<AuthEvent>,
    source: Arc<dyn SessionSource>,
    state: Arc<watch::Sender<SessionState>>,
    timeout: Duration,
) {
    loop {
        let next = match events.recv().await {
            Ok(AuthEvent::SignedIn(profile)) => SessionState::Authenticated(profile),
            Ok(AuthEvent::SignedOut) => SessionState::Guest,
            Ok(AuthEvent::SessionRefreshed) => resolve(source.as_ref(), timeout).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Session events lagged, re-resolving");
                resolve(source.as_ref(), timeout).await
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if apply(&state, next) {
            debug!("Session state changed");
        }
    }
}

use async_trait::async_trait;
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use backend::{
    AuthEvent, BackendHub, BackendSessionSource, MockIdentityProvider, SessionGate, SessionSource,
    SessionState, SignInRequest,
};
use proto::{Identity, Role, SessionError, UserProfile};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};
use vault::{Codec, ConfigResolver, MapEnv, MemoryStore};

const GATE_TIMEOUT: Duration = Duration::from_secs(2);

fn profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        display_name: "Analyst".to_string(),
        email: format!("{id}@example.com"),
        avatar_url: String::new(),
        role: Role::Consultant,
    }
}

/// Scripted session source that counts lookups.
struct ScriptedSource {
    current: Result<Option<UserProfile>, SessionError>,
    sign_out_fails: bool,
    lookup_delay: Option<Duration>,
    lookups: AtomicUsize,
    events: broadcast::Sender<AuthEvent>,
}

impl ScriptedSource {
    fn new(current: Result<Option<UserProfile>, SessionError>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            current,
            sign_out_fails: false,
            lookup_delay: None,
            lookups: AtomicUsize::new(0),
            events,
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for ScriptedSource {
    async fn current_user(&self) -> Result<Option<UserProfile>, SessionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.current {
            Ok(user) => Ok(user.clone()),
            Err(e) => Err(SessionError::ResolutionFailed(e.to_string())),
        }
    }

    async fn sign_in(&self, _request: &SignInRequest) -> Result<UserProfile, SessionError> {
        Err(SessionError::SignInFailed("scripted".to_string()))
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        if self.sign_out_fails {
            Err(SessionError::ResolutionFailed("remote sign-out refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

async fn wait_for_state(gate: &SessionGate, expected: SessionState) {
    let mut rx = gate.subscribe();
    timeout(GATE_TIMEOUT, rx.wait_for(|state| *state == expected))
        .await
        .expect("state change in time")
        .expect("gate alive");
}

#[tokio::test]
async fn unconfigured_backend_settles_guest_without_lookup() {
    let source = Arc::new(ScriptedSource::new(Ok(Some(profile("u-1")))));
    let gate = SessionGate::new(source.clone(), GATE_TIMEOUT);
    assert!(gate.state().is_loading());

    assert_eq!(gate.start(false).await, SessionState::Guest);
    assert_eq!(source.lookups(), 0);
    assert_eq!(gate.state().identity(), Some(Identity::Guest));
}

#[tokio::test]
async fn existing_session_settles_authenticated() {
    let source = Arc::new(ScriptedSource::new(Ok(Some(profile("u-1")))));
    let gate = SessionGate::new(source.clone(), GATE_TIMEOUT);

    assert_eq!(
        gate.start(true).await,
        SessionState::Authenticated(profile("u-1"))
    );
    assert_eq!(source.lookups(), 1);
}

#[tokio::test]
async fn failed_lookup_settles_guest() {
    let source = Arc::new(ScriptedSource::new(Err(SessionError::ResolutionFailed(
        "boom".to_string(),
    ))));
    let gate = SessionGate::new(source, GATE_TIMEOUT);
    assert_eq!(gate.start(true).await, SessionState::Guest);
}

#[tokio::test]
async fn hanging_lookup_settles_guest_after_timeout() {
    let mut scripted = ScriptedSource::new(Ok(Some(profile("u-1"))));
    scripted.lookup_delay = Some(Duration::from_secs(30));
    let gate = SessionGate::new(Arc::new(scripted), Duration::from_millis(100));

    let state = timeout(Duration::from_secs(5), gate.start(true))
        .await
        .expect("gate settles");
    assert_eq!(state, SessionState::Guest);
}

#[tokio::test]
async fn session_events_update_state() {
    let source = Arc::new(ScriptedSource::new(Ok(None)));
    let gate = SessionGate::new(source.clone(), GATE_TIMEOUT);
    assert_eq!(gate.start(true).await, SessionState::Guest);

    source
        .events
        .send(AuthEvent::SignedIn(profile("u-2")))
        .expect("listener subscribed");
    wait_for_state(&gate, SessionState::Authenticated(profile("u-2"))).await;

    source.events.send(AuthEvent::SignedOut).expect("listener subscribed");
    wait_for_state(&gate, SessionState::Guest).await;
}

#[tokio::test]
async fn dropping_gate_releases_listener() {
    let source = Arc::new(ScriptedSource::new(Ok(None)));
    let gate = SessionGate::new(source.clone(), GATE_TIMEOUT);
    gate.start(true).await;
    assert_eq!(source.events.receiver_count(), 1);

    drop(gate);
    timeout(GATE_TIMEOUT, async {
        while source.events.receiver_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener released");
}

#[tokio::test]
async fn restart_does_not_stack_listeners() {
    let source = Arc::new(ScriptedSource::new(Ok(None)));
    let gate = SessionGate::new(source.clone(), GATE_TIMEOUT);
    gate.start(true).await;
    gate.start(true).await;

    timeout(GATE_TIMEOUT, async {
        while source.events.receiver_count() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("previous listener released");
    assert_eq!(source.events.receiver_count(), 1);
}

#[tokio::test]
async fn sign_out_ends_guest_even_when_remote_fails() {
    let mut scripted = ScriptedSource::new(Ok(Some(profile("u-1"))));
    scripted.sign_out_fails = true;
    let gate = SessionGate::new(Arc::new(scripted), GATE_TIMEOUT);
    gate.start(true).await;

    gate.sign_out().await;
    assert_eq!(gate.state(), SessionState::Guest);
}

#[tokio::test]
async fn failed_sign_in_keeps_state() {
    let source = Arc::new(ScriptedSource::new(Ok(None)));
    let gate = SessionGate::new(source, GATE_TIMEOUT);
    gate.start(true).await;

    let err = gate
        .sign_in(&SignInRequest::IdentityToken("token".to_string()))
        .await
        .expect_err("scripted failure");
    assert!(matches!(err, SessionError::SignInFailed(_)));
    assert_eq!(gate.state(), SessionState::Guest);
}

#[tokio::test]
async fn mock_identity_provider_signs_in_fixed_profile() {
    let provider = Arc::new(MockIdentityProvider::new(Duration::from_millis(10)));
    let gate = SessionGate::new(provider, GATE_TIMEOUT);
    assert_eq!(gate.start(true).await, SessionState::Guest);

    let identity = gate
        .sign_in(&SignInRequest::IdentityToken("idp-token".to_string()))
        .await
        .expect("mock sign-in");
    assert_eq!(identity.profile().display_name, "Strategic Agent");
    assert_eq!(identity.profile().role, Role::Executive);
    assert_eq!(
        gate.state(),
        SessionState::Authenticated(MockIdentityProvider::profile())
    );

    gate.sign_out().await;
    assert_eq!(gate.state(), SessionState::Guest);
}

#[tokio::test]
async fn mock_identity_provider_rejects_blank_token() {
    let provider = Arc::new(MockIdentityProvider::new(Duration::ZERO));
    let gate = SessionGate::new(provider, GATE_TIMEOUT);
    gate.start(true).await;
    assert!(
        gate.sign_in(&SignInRequest::IdentityToken("  ".to_string()))
            .await
            .is_err()
    );
}

// ── Backend-managed sessions against a mock auth API ─────────────────────────

async fn spawn_auth_backend() -> String {
    let user = json!({
        "id": "user-42",
        "email": "ops@polaris.os",
        "user_metadata": {"full_name": "Ops Lead", "role": "executive"}
    });
    let token_user = user.clone();
    let router = Router::new()
        .route(
            "/auth/v1/token",
            post(move || {
                let user = token_user.clone();
                async move {
                    Json(json!({
                        "access_token": "jwt-abc",
                        "refresh_token": "refresh-abc",
                        "expires_in": 3600,
                        "user": user
                    }))
                }
            }),
        )
        .route(
            "/auth/v1/user",
            get(move |headers: HeaderMap| {
                let user = user.clone();
                async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer jwt-abc") => Ok(Json(user)),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }
            }),
        )
        .route(
            "/auth/v1/logout",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock auth backend");
    });
    format!("http://{addr}")
}

fn hub() -> Arc<BackendHub> {
    let resolver = ConfigResolver::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MapEnv::new()),
        Codec::XorHex,
    );
    BackendHub::new(resolver, GATE_TIMEOUT)
}

#[tokio::test]
async fn no_config_anywhere_stays_guest() {
    let hub = hub();
    assert!(!hub.is_configured());

    let gate = SessionGate::new(Arc::new(BackendSessionSource::new(hub.clone())), GATE_TIMEOUT);
    assert_eq!(gate.start(hub.is_configured()).await, SessionState::Guest);
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn backend_password_sign_in_persists_session() {
    let url = spawn_auth_backend().await;
    let hub = hub();
    hub.update_config(&url, "anon-key").expect("valid config");

    let gate = SessionGate::new(Arc::new(BackendSessionSource::new(hub.clone())), GATE_TIMEOUT);
    assert_eq!(gate.start(true).await, SessionState::Guest);

    let identity = gate
        .sign_in(&SignInRequest::Password {
            email: "ops@polaris.os".to_string(),
            password: "hunter22".to_string(),
        })
        .await
        .expect("sign-in");
    assert_eq!(identity.user_id(), Some("user-42"));
    assert_eq!(identity.profile().display_name, "Ops Lead");
    assert_eq!(identity.profile().role, Role::Executive);

    let stored = hub.stored_session().expect("session persisted");
    assert_eq!(stored.access_token, "jwt-abc");
    assert!(!stored.is_expired());

    // A fresh gate resumes the persisted session.
    let resumed = SessionGate::new(Arc::new(BackendSessionSource::new(hub.clone())), GATE_TIMEOUT);
    assert_eq!(
        resumed.start(true).await,
        SessionState::Authenticated(identity.profile())
    );
}

#[tokio::test]
async fn backend_sign_out_clears_session_despite_remote_failure() {
    let url = spawn_auth_backend().await;
    let hub = hub();
    hub.update_config(&url, "anon-key").expect("valid config");
    let gate = SessionGate::new(Arc::new(BackendSessionSource::new(hub.clone())), GATE_TIMEOUT);
    gate.start(true).await;
    gate.sign_in(&SignInRequest::Password {
        email: "ops@polaris.os".to_string(),
        password: "hunter22".to_string(),
    })
    .await
    .expect("sign-in");

    gate.sign_out().await;
    assert_eq!(gate.state(), SessionState::Guest);
    assert!(hub.stored_session().is_none());
}

#[tokio::test]
async fn backend_source_rejects_identity_tokens() {
    let url = spawn_auth_backend().await;
    let hub = hub();
    hub.update_config(&url, "anon-key").expect("valid config");
    let source = BackendSessionSource::new(hub);
    assert!(matches!(
        source
            .sign_in(&SignInRequest::IdentityToken("idp".to_string()))
            .await,
        Err(SessionError::SignInFailed(_))
    ));
}

#[tokio::test]
async fn config_update_refreshes_listening_gate() {
    let url = spawn_auth_backend().await;
    let hub = hub();
    hub.update_config(&url, "anon-key").expect("valid config");
    let gate = SessionGate::new(Arc::new(BackendSessionSource::new(hub.clone())), GATE_TIMEOUT);
    gate.start(true).await;
    gate.sign_in(&SignInRequest::Password {
        email: "ops@polaris.os".to_string(),
        password: "hunter22".to_string(),
    })
    .await
    .expect("sign-in");

    // Pointing at a backend that does not know the token drops to guest.
    hub.update_config("http://127.0.0.1:9", "other-key")
        .expect("valid config");
    wait_for_state(&gate, SessionState::Guest).await;
}

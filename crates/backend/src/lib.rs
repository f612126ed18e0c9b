//! Hosted backend access: REST client, reachability probe, session gate,
//! and scan history.

pub mod client;
pub mod history;
pub mod hub;
pub mod probe;
pub mod session;

/// Backend REST client and persisted session tokens.
pub use client::{BackendClient, PLACEHOLDER_ENDPOINT, StoredSession};
/// Saved scan results.
pub use history::{HistoryError, SavedTo, ScanHistory};
/// Composition root owning the resolver and live client registry.
pub use hub::BackendHub;
/// Reachability probe.
pub use probe::{PROBE_COLLECTION, probe_backend, probe_backend_state};
/// Session/identity gate and session sources.
pub use session::{
    AuthEvent, BackendSessionSource, MockIdentityProvider, SessionGate, SessionSource,
    SessionState, SignInRequest,
};

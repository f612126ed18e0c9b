//! Shared types for the configuration, connectivity, and session layers.
//!
//! This crate defines the credential/identity/probe data model, the
//! collaborator payloads exchanged with the inference API and backend, and
//! strongly-typed error enums shared across the workspace.

pub mod credential;
pub mod error;
pub mod identity;
pub mod probe;
pub mod scan;

/// Re-export of credential and resolution types.
pub use credential::{ConfigSource, CredentialPair, ResolvedConfig, mask_secret};
/// Re-export of all error types.
pub use error::*;
/// Re-export of identity types.
pub use identity::{Identity, Role, UserProfile};
/// Re-export of connectivity probe results.
pub use probe::{Connectivity, ConnectivityState, InferenceProbeReport};
/// Re-export of collaborator payloads.
pub use scan::{
    CalibrationReport, CognitiveCrystal, PowerActor, PowerDynamicsReport, PowerLink,
    PowerLinkKind, ResonanceAnalysis, Ripple, RiskAssessment, RiskAxes, RiskLevel, ScanRecord,
};

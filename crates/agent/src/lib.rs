//! Inference API access: provider interface, Gemini adapter, connectivity
//! probe, and structured analysis calls.

pub mod analysis;
pub mod gemini;
pub mod probe;
pub mod provider;
pub mod schema;

/// Structured analysis calls.
pub use analysis::{Analyst, parse_reply};
/// Gemini `generateContent` provider.
pub use gemini::{GEMINI_BASE_URL, GeminiProvider};
/// Inference round-trip probe.
pub use probe::{PROBE_PROMPT, probe_inference};
/// Provider interface and request model.
pub use provider::{DEFAULT_ANALYSIS_MODEL, DEFAULT_PROBE_MODEL, GenerateRequest, InferenceProvider};

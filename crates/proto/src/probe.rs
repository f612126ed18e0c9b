use serde::{Deserialize, Serialize};

/// Reachability of an external collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

impl Connectivity {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Reachable
        } else {
            Self::Unreachable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Reachable => "reachable",
            Self::Unreachable => "unreachable",
        }
    }
}

/// Fresh result of one connectivity check. Never cached across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub status: Connectivity,
    /// Human-readable diagnostic, if any.
    pub diagnostic: Option<String>,
    /// Whether the caller should prompt for a new credential.
    pub should_reset_credential: bool,
}

/// Outcome of the inference round-trip probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceProbeReport {
    pub success: bool,
    pub message: String,
    pub should_reset_credential: bool,
}

impl InferenceProbeReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            should_reset_credential: false,
        }
    }

    pub fn failed(message: impl Into<String>, should_reset_credential: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            should_reset_credential,
        }
    }
}

impl From<&InferenceProbeReport> for ConnectivityState {
    fn from(report: &InferenceProbeReport) -> Self {
        Self {
            status: Connectivity::from_reachable(report.success),
            diagnostic: Some(report.message.clone()),
            should_reset_credential: report.should_reset_credential,
        }
    }
}

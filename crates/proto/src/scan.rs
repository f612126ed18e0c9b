//! Payloads exchanged with the inference API and rows stored in the backend
//! `scans` collection. Field names follow the JSON contracts of those
//! collaborators; nothing here is computed locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse risk label returned by the risk analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// The three scored risk axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAxes {
    pub chronic_degradation: f64,
    pub irreversible_inflection: f64,
    pub judgment_sovereignty: f64,
}

/// Structured result of a scenario risk scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub axes: RiskAxes,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// One row of the backend `scans` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub scenario: String,
    pub axes: RiskAxes,
    pub risk_level: RiskLevel,
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ScanRecord {
    /// Builds a new row owned by `user_id` from a finished assessment.
    pub fn from_assessment(
        user_id: impl Into<String>,
        scenario: impl Into<String>,
        assessment: RiskAssessment,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            scenario: scenario.into(),
            axes: assessment.axes,
            risk_level: assessment.risk_level,
            summary: assessment.summary,
            recommendations: assessment.recommendations,
        }
    }
}

/// One ordered consequence in a ripple deduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ripple {
    pub order: u32,
    pub impact: String,
    pub probability: f64,
}

/// Result of a global-event ripple deduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResonanceAnalysis {
    pub ripples: Vec<Ripple>,
    pub reasoning_path: Vec<String>,
    pub protocol_updates: Vec<String>,
    pub entropy_score: f64,
}

/// Extracted rule for future scans. Opaque collaborator payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveCrystal {
    pub rule: String,
    pub weight_adjustment: String,
}

/// Result of comparing a past prediction with the observed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub gap_analysis: String,
    pub thinking_trace: Vec<String>,
    pub calibration_delta: f64,
    pub cognitive_crystal: CognitiveCrystal,
    pub bias_warning: String,
}

/// Actor in a power-dynamics map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerActor {
    pub id: String,
    pub name: String,
    pub role: String,
    pub power: f64,
    pub loyalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerLinkKind {
    Constrain,
    Support,
    Conflict,
}

/// Directed relationship between two actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLink {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: PowerLinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerDynamicsReport {
    pub instability_points: Vec<String>,
    pub leverage_points: Vec<String>,
    pub strategic_advice: String,
}

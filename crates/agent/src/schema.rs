//! Response schemas for structured analysis replies.

use serde_json::{Value, json};

fn string_array() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

pub fn risk_assessment() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "axes": {
                "type": "OBJECT",
                "properties": {
                    "chronicDegradation": { "type": "NUMBER" },
                    "irreversibleInflection": { "type": "NUMBER" },
                    "judgmentSovereignty": { "type": "NUMBER" }
                },
                "required": ["chronicDegradation", "irreversibleInflection", "judgmentSovereignty"]
            },
            "riskLevel": { "type": "STRING", "enum": ["LOW", "MEDIUM", "HIGH"] },
            "summary": { "type": "STRING" },
            "recommendations": string_array()
        },
        "required": ["axes", "riskLevel", "summary", "recommendations"]
    })
}

pub fn resonance_analysis() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "ripples": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "order": { "type": "INTEGER" },
                        "impact": { "type": "STRING" },
                        "probability": { "type": "NUMBER" }
                    },
                    "required": ["order", "impact", "probability"]
                }
            },
            "reasoningPath": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Step-by-step logic nodes"
            },
            "protocolUpdates": string_array(),
            "entropyScore": { "type": "NUMBER" }
        },
        "required": ["ripples", "reasoningPath", "protocolUpdates", "entropyScore"]
    })
}

pub fn calibration_report() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "gapAnalysis": { "type": "STRING" },
            "thinkingTrace": string_array(),
            "calibrationDelta": { "type": "NUMBER" },
            "cognitiveCrystal": {
                "type": "OBJECT",
                "properties": {
                    "rule": { "type": "STRING" },
                    "weightAdjustment": { "type": "STRING" }
                },
                "required": ["rule", "weightAdjustment"]
            },
            "biasWarning": { "type": "STRING" }
        },
        "required": ["gapAnalysis", "thinkingTrace", "calibrationDelta", "cognitiveCrystal", "biasWarning"]
    })
}

pub fn power_dynamics_report() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "instabilityPoints": string_array(),
            "leveragePoints": string_array(),
            "strategicAdvice": { "type": "STRING" }
        },
        "required": ["instabilityPoints", "leveragePoints", "strategicAdvice"]
    })
}

//! JSON protocol spoken by the triage endpoints.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of labels a triage answer can carry.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Acne,
    Other,
    /// Degraded answer when a prediction failed but the service stayed lenient.
    Unknown,
    /// Answer attached to an internal error response.
    Error,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Acne => "acne",
            Label::Other => "other",
            Label::Unknown => "unknown",
            Label::Error => "error",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a triage answer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub label: Label,
    pub confidence: f32,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResponse {
    pub fn new(label: Label, confidence: f32, processing_time_ms: u64) -> Self {
        Self {
            label,
            confidence,
            processing_time_ms,
            error: None,
        }
    }

    pub fn error(message: String, processing_time_ms: u64) -> Self {
        Self {
            label: Label::Error,
            confidence: 0.0,
            processing_time_ms,
            error: Some(message),
        }
    }
}

/// Body of the health endpoint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".into(),
        }
    }
}

/// Body of a rejected request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

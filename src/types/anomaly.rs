//! Anomaly findings emitted by the detectors.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::features::FeatureRow;
use super::reading::timestamp_format;

/// Discrete urgency bucket attached to each finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detector that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    TempDrift,
    CloggedFilter,
    CompressorFailure,
    OscillatingControl,
    IsolationForest,
}

impl RuleName {
    /// Emission order: the four rules, then the unsupervised scorer.
    pub const ALL: [Self; 5] = [
        Self::TempDrift,
        Self::CloggedFilter,
        Self::CompressorFailure,
        Self::OscillatingControl,
        Self::IsolationForest,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TempDrift => "temp_drift",
            Self::CloggedFilter => "clogged_filter",
            Self::CompressorFailure => "compressor_failure",
            Self::OscillatingControl => "oscillating_control",
            Self::IsolationForest => "isolation_forest",
        }
    }
}

impl std::fmt::Display for RuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected anomaly-bearing reading.
///
/// Created only by detectors and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub zone_id: String,
    pub ahu_id: String,
    /// Signal implicated, or "multiple" for the unsupervised scorer
    pub metric: String,
    /// Positive, detector-specific scale
    pub score: f64,
    pub rule_name: RuleName,
    pub severity: Severity,
    /// Ground-truth pass-through, "unknown" when absent
    pub fault_type_label: String,
}

impl AnomalyRecord {
    /// Build a finding for `row`, copying identity and ground-truth label.
    pub fn from_row(
        row: &FeatureRow,
        rule_name: RuleName,
        metric: &str,
        score: f64,
        severity: Severity,
    ) -> Self {
        Self {
            timestamp: row.reading.timestamp,
            zone_id: row.reading.zone_id.clone(),
            ahu_id: row.reading.ahu_id.clone(),
            metric: metric.to_string(),
            score,
            rule_name,
            severity,
            fault_type_label: row.reading.fault_label().to_string(),
        }
    }
}

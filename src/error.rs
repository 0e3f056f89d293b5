//! Engine error taxonomy.
//!
//! Every fatal condition the detection engine can hit maps to one variant.
//! Empty input and empty detection results are not errors; they come back as
//! empty, correctly typed sequences.

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    /// A required field is missing from the input or between stages.
    #[error("Schema error: missing required field '{field}'{}", row_suffix(.row))]
    Schema { field: String, row: Option<usize> },

    /// Duplicate timestamps within a zone.
    #[error("Ordering error in zone {zone}: duplicate timestamp {timestamp}")]
    Ordering { zone: String, timestamp: NaiveDateTime },

    /// Scoring was attempted before a successful `train()`.
    #[error("Unsupervised scorer has not been trained")]
    NotTrained,

    /// A restored model was fitted on a different feature layout.
    #[error("Model schema mismatch: expected features {expected:?}, artifact has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unsupported model artifact version: file has v{found}, expected v{expected}")]
    UnsupportedModelVersion { found: u32, expected: u32 },

    #[error("Training subset is empty (normal_only = {normal_only})")]
    EmptyTrainingSet { normal_only: bool },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn row_suffix(row: &Option<usize>) -> String {
    row.map(|r| format!(" (row {r})")).unwrap_or_default()
}

impl DetectionError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            row: None,
        }
    }

    pub fn missing_field_at(field: impl Into<String>, row: usize) -> Self {
        Self::Schema {
            field: field.into(),
            row: Some(row),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_field_and_row() {
        let err = DetectionError::missing_field_at("temp_zone_c", 7);
        let msg = err.to_string();
        assert!(msg.contains("temp_zone_c"));
        assert!(msg.contains("row 7"));

        let err = DetectionError::missing_field("fan_rolling_mean_short");
        assert!(!err.to_string().contains("row"));
    }
}

//! HVAC Sentinel: fault detection for building HVAC zones
//!
//! Batch anomaly detection over zone sensor readings.
//!
//! ## Architecture
//!
//! - **Features**: cleaning, per-zone rolling statistics, lags and change rates
//! - **Rules**: temperature drift, clogged filter, compressor failure, oscillating control
//! - **Scorer**: isolation forest for anomalies outside the rule signatures
//! - **Pipeline**: zone-parallel orchestration into one anomaly record stream

pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod rules;
pub mod scorer;
pub mod types;

// Re-export configuration
pub use config::DetectionConfig;

// Re-export errors
pub use error::{DetectionError, Result};

// Re-export commonly used types
pub use types::{
    AnomalyRecord, FeatureRow, FeatureTable, Mode, RawReading, RuleName, SensorReading, Severity,
};

// Re-export detectors
pub use features::FeatureEngineer;
pub use rules::{Rule, RuleEngine};
pub use scorer::UnsupervisedScorer;

// Re-export orchestration
pub use pipeline::{DetectionOrchestrator, DetectionOutcome, DetectionReport, ScorerMode};

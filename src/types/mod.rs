//! Shared data structures for the HVAC detection pipeline
//!
//! Records flow through the engine in one direction:
//! - `RawReading` (boundary input, fields optional) → cleaning
//! - `SensorReading` (validated zone sample) → FeatureEngineer
//! - `FeatureRow` / `FeatureTable` (derived diagnostics) → rules + scorer
//! - `AnomalyRecord` (findings, append-only)

mod anomaly;
mod features;
mod reading;

pub use anomaly::*;
pub use features::*;
pub use reading::*;

//! Versioned model artifact for the unsupervised scorer.
//!
//! One JSON document carries everything needed to score without the
//! training data:
//! - the forest (flat node arenas, offset, subsample size)
//! - standardization mean/scale per feature
//! - the ordered feature-name list the model was fitted on
//! - training contamination and seed
//!
//! Loading checks the format version first and the feature list second;
//! a model fitted on a different feature layout is refused outright.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use super::forest::IsolationForest;
use super::standardizer::Standardizer;
use crate::error::{DetectionError, Result};

/// Current artifact format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Format version for forward compatibility.
    pub format_version: u32,
    /// Feature columns in model input order.
    pub feature_names: Vec<String>,
    pub standardizer: Standardizer,
    pub forest: IsolationForest,
    pub contamination: f64,
    pub seed: u64,
    /// Rows in the training subset.
    pub training_rows: usize,
}

/// Only the version field, read before committing to the full layout.
#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl ModelArtifact {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and check compatibility with the feature layout in use.
    pub fn decode(bytes: &[u8], expected_features: &[&str]) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.format_version != FORMAT_VERSION {
            return Err(DetectionError::UnsupportedModelVersion {
                found: probe.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let artifact: Self = serde_json::from_slice(bytes)?;
        if artifact.feature_names.iter().map(String::as_str).ne(expected_features.iter().copied()) {
            return Err(DetectionError::SchemaMismatch {
                expected: expected_features.iter().map(|s| (*s).to_string()).collect(),
                found: artifact.feature_names,
            });
        }

        let dims = artifact.feature_names.len();
        if !artifact.standardizer.is_consistent() || artifact.standardizer.dims() != dims {
            return Err(DetectionError::InvalidParameter {
                name: "standardizer",
                reason: format!("expected {dims} finite mean/scale pairs"),
            });
        }
        if !artifact.forest.is_consistent(dims) {
            return Err(DetectionError::InvalidParameter {
                name: "forest",
                reason: "tree structure does not match the feature layout".to_string(),
            });
        }
        Ok(artifact)
    }
}

/// Save artifact bytes to disk atomically (write temp file, then rename).
pub fn save_to_disk(bytes: &[u8], path: &Path) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load artifact bytes from disk.
pub fn load_from_disk(path: &Path) -> io::Result<Vec<u8>> {
    std::fs::read(path)
}

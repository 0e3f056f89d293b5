//! Unsupervised Scorer - isolation-forest outlier detection
//!
//! Catches anomalies outside the four explicit rule signatures by scoring
//! an 11-dimensional feature vector per row.
//!
//! ## Lifecycle
//!
//! `Untrained` → `Trained`. A successful `train()` installs a complete new
//! model; nothing is ever updated incrementally. Scoring an untrained scorer
//! fails with `NotTrained`.
//!
//! ## Leakage
//!
//! Standardization statistics come from the training subset only and are
//! frozen into the model; scoring never recomputes them from the data being
//! scored.

pub mod artifact;
pub mod forest;
pub mod standardizer;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{self, ScorerConfig};
use crate::error::{DetectionError, Result};
use crate::features::round_to;
use crate::types::{columns, AnomalyRecord, FeatureRow, FeatureTable, RuleName, Severity};

use artifact::{ModelArtifact, FORMAT_VERSION};
use forest::IsolationForest;
use standardizer::Standardizer;

/// Model input columns, in order.
pub const SCORER_FEATURES: [&str; 11] = [
    columns::TEMP_ZONE_C,
    columns::TEMP_ERROR_C,
    columns::POWER_KW,
    columns::FAN_SPEED_PCT,
    columns::DELTA_RETURN_SUPPLY,
    columns::TEMP_ERROR_ROLLING_MEAN_LONG,
    columns::TEMP_ERROR_ROLLING_STD_LONG,
    columns::POWER_ROLLING_MEAN_LONG,
    columns::POWER_ROLLING_STD_LONG,
    columns::TEMP_CHANGE_RATE,
    columns::POWER_CHANGE_RATE,
];

/// Metric name on scorer findings; the model implicates no single signal.
const METRIC: &str = "multiple";

/// Decimal places kept on scorer finding scores.
const SCORE_DECIMALS: u32 = 4;

/// Smallest score representable at `SCORE_DECIMALS`.
const MIN_SCORE: f64 = 1e-4;

/// Per-row scoring outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Decision function below the contamination-derived threshold
    pub is_anomaly: bool,
    /// |decision function|
    pub magnitude: f64,
    /// `score_samples`: negated isolation score, lower is stranger
    pub raw_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct TrainedModel {
    standardizer: Standardizer,
    forest: IsolationForest,
    feature_names: Vec<String>,
    contamination: f64,
    seed: u64,
    training_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum ScorerState {
    Untrained,
    Trained(Box<TrainedModel>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsupervisedScorer {
    config: ScorerConfig,
    state: ScorerState,
}

impl Default for UnsupervisedScorer {
    fn default() -> Self {
        Self::new(config::get().scorer.clone())
    }
}

impl UnsupervisedScorer {
    /// An untrained scorer. `config` supplies forest size and severity cut points.
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            config,
            state: ScorerState::Untrained,
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ScorerState::Trained(_))
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Feature names the trained model expects, `None` when untrained.
    pub fn feature_names(&self) -> Option<&[String]> {
        match &self.state {
            ScorerState::Trained(m) => Some(&m.feature_names),
            ScorerState::Untrained => None,
        }
    }

    /// Fit standardization and the forest on `table`.
    ///
    /// With `normal_only`, only rows labelled "none" are used. On error the
    /// scorer keeps its previous state.
    pub fn train(
        &mut self,
        table: &FeatureTable,
        normal_only: bool,
        contamination: f64,
        seed: u64,
    ) -> Result<()> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(DetectionError::InvalidParameter {
                name: "contamination",
                reason: format!("{contamination} is outside (0, 0.5]"),
            });
        }
        if self.config.n_estimators == 0 {
            return Err(DetectionError::InvalidParameter {
                name: "n_estimators",
                reason: "at least one tree is required".to_string(),
            });
        }
        table.require_columns(&SCORER_FEATURES)?;

        let samples: Vec<Vec<f64>> = table
            .rows()
            .iter()
            .filter(|r| !normal_only || r.reading.is_labelled_normal())
            .map(feature_vector)
            .collect();
        if samples.is_empty() {
            return Err(DetectionError::EmptyTrainingSet { normal_only });
        }

        let standardizer = Standardizer::fit(&samples, SCORER_FEATURES.len());
        let scaled: Vec<Vec<f64>> = samples.iter().map(|x| standardizer.transform(x)).collect();
        let forest = IsolationForest::fit(
            &scaled,
            self.config.n_estimators,
            self.config.max_samples,
            contamination,
            seed,
        );

        info!(
            rows = samples.len(),
            normal_only,
            trees = forest.n_trees(),
            sample_size = forest.sample_size(),
            offset = forest.offset(),
            "Isolation forest trained"
        );

        self.state = ScorerState::Trained(Box::new(TrainedModel {
            standardizer,
            forest,
            feature_names: SCORER_FEATURES.iter().map(|s| (*s).to_string()).collect(),
            contamination,
            seed,
            training_rows: samples.len(),
        }));
        Ok(())
    }

    /// Score every row of `table`, in table order.
    pub fn score(&self, table: &FeatureTable) -> Result<Vec<ScoredRow>> {
        let model = self.model()?;
        let names: Vec<&str> = model.feature_names.iter().map(String::as_str).collect();
        table.require_columns(&names)?;

        Ok(table
            .rows()
            .par_iter()
            .map(|row| {
                let x: Vec<f64> = names.iter().map(|c| row.value(c).unwrap_or(0.0)).collect();
                let z = model.standardizer.transform(&x);
                let raw_score = model.forest.score_samples(&z);
                let decision = raw_score - model.forest.offset();
                ScoredRow {
                    is_anomaly: decision < 0.0,
                    magnitude: decision.abs(),
                    raw_score,
                }
            })
            .collect())
    }

    /// Anomaly records for the rows the model flags.
    pub fn detect(&self, table: &FeatureTable) -> Result<Vec<AnomalyRecord>> {
        let scored = self.score(table)?;
        let records: Vec<AnomalyRecord> = table
            .rows()
            .iter()
            .zip(&scored)
            .filter(|(_, s)| s.is_anomaly)
            .map(|(row, s)| self.record(row, s))
            .collect();
        debug!(scored = scored.len(), flagged = records.len(), "Scorer detection complete");
        Ok(records)
    }

    /// Severity bucket for a magnitude.
    pub fn severity(&self, magnitude: f64) -> Severity {
        if magnitude > self.config.severity_high {
            Severity::High
        } else if magnitude > self.config.severity_medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn record(&self, row: &FeatureRow, scored: &ScoredRow) -> AnomalyRecord {
        let score = round_to(scored.magnitude, SCORE_DECIMALS).max(MIN_SCORE);
        AnomalyRecord::from_row(
            row,
            RuleName::IsolationForest,
            METRIC,
            score,
            self.severity(scored.magnitude),
        )
    }

    /// Serialize the trained model as one versioned artifact.
    pub fn persist(&self) -> Result<Vec<u8>> {
        let m = self.model()?;
        ModelArtifact {
            format_version: FORMAT_VERSION,
            feature_names: m.feature_names.clone(),
            standardizer: m.standardizer.clone(),
            forest: m.forest.clone(),
            contamination: m.contamination,
            seed: m.seed,
            training_rows: m.training_rows,
        }
        .encode()
    }

    /// Restore a trained scorer, using the global config for severity cut points.
    pub fn restore(bytes: &[u8], expected_features: &[&str]) -> Result<Self> {
        Self::restore_with_config(bytes, expected_features, config::get().scorer.clone())
    }

    pub fn restore_with_config(
        bytes: &[u8],
        expected_features: &[&str],
        config: ScorerConfig,
    ) -> Result<Self> {
        let a = ModelArtifact::decode(bytes, expected_features)?;
        info!(
            trees = a.forest.n_trees(),
            training_rows = a.training_rows,
            contamination = a.contamination,
            "Isolation forest restored"
        );
        Ok(Self {
            config,
            state: ScorerState::Trained(Box::new(TrainedModel {
                standardizer: a.standardizer,
                forest: a.forest,
                feature_names: a.feature_names,
                contamination: a.contamination,
                seed: a.seed,
                training_rows: a.training_rows,
            })),
        })
    }

    fn model(&self) -> Result<&TrainedModel> {
        match &self.state {
            ScorerState::Trained(m) => Ok(m),
            ScorerState::Untrained => Err(DetectionError::NotTrained),
        }
    }
}

fn feature_vector(row: &FeatureRow) -> Vec<f64> {
    SCORER_FEATURES
        .iter()
        .map(|c| row.value(c).unwrap_or(0.0))
        .collect()
}

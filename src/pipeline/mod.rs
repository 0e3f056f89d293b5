//! Detection Pipeline - batch orchestration of features, rules and scorer
//!
//! ## Phases
//!
//! ```text
//! PHASE 1: Features     (per zone, rayon pool, cancellable per zone)
//! PHASE 2: Rules        (per zone, rayon pool, cancellable per zone)
//! PHASE 3: Merge        (single aggregating step, zone order)
//! PHASE 4: Scorer       (train on batch or use a pretrained model)
//! PHASE 5: Report       (rule findings first, scorer findings after)
//! ```
//!
//! Zone tasks share nothing; each returns its own result and only the merge
//! step writes the output buffers. A cancelled run still returns what the
//! completed zones produced, wrapped as [`DetectionOutcome::Partial`] so it
//! can never be mistaken for a complete result.

mod report;

pub use report::{DetectionReport, RunSummary};

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{self, DetectionConfig, ScorerConfig};
use crate::error::Result;
use crate::features::{cleaning, FeatureEngineer};
use crate::rules::{RuleEngine, ZoneFindings};
use crate::scorer::UnsupervisedScorer;
use crate::types::{AnomalyRecord, FeatureRow, FeatureTable, RawReading, SensorReading};

/// How the unsupervised scorer takes part in a run.
#[derive(Debug, Clone)]
pub enum ScorerMode {
    /// Rules only
    Disabled,
    /// Fit a fresh model on the batch being scanned, then score it
    TrainOnBatch,
    /// Score with a model trained earlier
    Pretrained(UnsupervisedScorer),
}

/// Result of a run.
#[derive(Debug, Clone)]
pub enum DetectionOutcome {
    Complete(DetectionReport),
    /// Cancelled before every zone (or the scorer) finished. `report` holds
    /// only the findings of `completed_zones`.
    Partial {
        report: DetectionReport,
        completed_zones: Vec<String>,
        skipped_zones: Vec<String>,
    },
}

impl DetectionOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn report(&self) -> &DetectionReport {
        match self {
            Self::Complete(report) | Self::Partial { report, .. } => report,
        }
    }

    pub fn into_report(self) -> DetectionReport {
        match self {
            Self::Complete(report) | Self::Partial { report, .. } => report,
        }
    }
}

/// Per-zone unit outcome; `None` when cancellation skipped the zone.
type ZoneResult<T> = (String, Option<T>);

/// Merged output of the per-zone phases.
struct ZoneScan {
    table: FeatureTable,
    rule_records: Vec<AnomalyRecord>,
    completed_zones: Vec<String>,
    skipped_zones: Vec<String>,
}

pub struct DetectionOrchestrator {
    /// Phase 1
    engineer: FeatureEngineer,
    /// Phase 2
    rules: RuleEngine,
    /// Phase 4: training parameters for `TrainOnBatch`
    scorer_config: ScorerConfig,
    scorer_mode: ScorerMode,
}

impl Default for DetectionOrchestrator {
    fn default() -> Self {
        Self::new(config::get())
    }
}

impl DetectionOrchestrator {
    /// Build from a configuration. The scorer trains on each batch unless
    /// it is disabled in `[scorer]`.
    pub fn new(config: &DetectionConfig) -> Self {
        let scorer_mode = if config.scorer.enabled {
            ScorerMode::TrainOnBatch
        } else {
            ScorerMode::Disabled
        };
        Self {
            engineer: FeatureEngineer::new(config.features.clone()),
            rules: RuleEngine::new(config.rules.clone()),
            scorer_config: config.scorer.clone(),
            scorer_mode,
        }
    }

    pub fn with_scorer_mode(mut self, mode: ScorerMode) -> Self {
        self.scorer_mode = mode;
        self
    }

    pub fn scorer_mode(&self) -> &ScorerMode {
        &self.scorer_mode
    }

    /// Validate and clean raw readings, then run.
    pub fn run_raw(&self, raw: Vec<RawReading>, cancel: &CancellationToken) -> Result<DetectionOutcome> {
        let cleaned = cleaning::prepare(raw)?;
        self.run(cleaned.readings, cancel)
    }

    /// Run every detector over a batch of readings.
    ///
    /// An ordering error in any zone aborts the run; the error names the
    /// first failing zone in zone order.
    pub fn run(&self, readings: Vec<SensorReading>, cancel: &CancellationToken) -> Result<DetectionOutcome> {
        let scan = self.scan_zones(readings, cancel)?;
        self.finish(scan, cancel)
    }

    /// Phases 1 to 3.
    fn scan_zones(&self, readings: Vec<SensorReading>, cancel: &CancellationToken) -> Result<ZoneScan> {
        let zones: Vec<(String, Vec<SensorReading>)> =
            FeatureEngineer::group_by_zone(readings).into_iter().collect();
        info!(zones = zones.len(), "Detection run started");

        // ====================================================================
        // PHASE 1: Features
        // ====================================================================
        let features: Vec<ZoneResult<Result<Vec<FeatureRow>>>> = zones
            .into_par_iter()
            .map(|(zone, readings)| {
                if cancel.is_cancelled() {
                    return (zone, None);
                }
                let rows = self.engineer.compute_zone(&zone, readings);
                (zone, Some(rows))
            })
            .collect();

        let mut skipped_zones = Vec::new();
        let mut feature_zones: Vec<(String, Vec<FeatureRow>)> = Vec::new();
        for (zone, rows) in features {
            match rows {
                Some(rows) => feature_zones.push((zone, rows?)),
                None => skipped_zones.push(zone),
            }
        }

        // ====================================================================
        // PHASE 2: Rules
        // ====================================================================
        let findings: Vec<ZoneResult<ZoneFindings>> = feature_zones
            .par_iter()
            .map(|(zone, rows)| {
                if cancel.is_cancelled() {
                    return (zone.clone(), None);
                }
                (zone.clone(), Some(self.rules.detect_zone(rows)))
            })
            .collect();

        // ====================================================================
        // PHASE 3: Merge
        // ====================================================================
        let mut completed_zones = Vec::new();
        let mut completed_findings = Vec::new();
        let mut rows = Vec::new();
        for ((zone, zone_rows), (_, zone_findings)) in feature_zones.into_iter().zip(findings) {
            match zone_findings {
                Some(f) => {
                    completed_findings.push(f);
                    rows.extend(zone_rows);
                    completed_zones.push(zone);
                }
                None => skipped_zones.push(zone),
            }
        }
        skipped_zones.sort();
        let table = FeatureTable::new(rows);
        let rule_records = RuleEngine::merge(completed_findings);
        debug!(
            completed = completed_zones.len(),
            skipped = skipped_zones.len(),
            rule_records = rule_records.len(),
            "Zone results merged"
        );

        Ok(ZoneScan {
            table,
            rule_records,
            completed_zones,
            skipped_zones,
        })
    }

    /// Phases 4 and 5.
    fn finish(&self, scan: ZoneScan, cancel: &CancellationToken) -> Result<DetectionOutcome> {
        let ZoneScan {
            table,
            rule_records,
            completed_zones,
            skipped_zones,
        } = scan;

        // ====================================================================
        // PHASE 4: Scorer
        // ====================================================================
        let (scorer_records, trained_model, scorer_cancelled) = self.run_scorer(&table, cancel)?;

        // ====================================================================
        // PHASE 5: Report
        // ====================================================================
        let report = DetectionReport::new(rule_records, scorer_records, table.len(), trained_model);
        let summary = report.summary();
        summary.log();

        if skipped_zones.is_empty() && !scorer_cancelled {
            info!(records = report.records.len(), "Detection run complete");
            Ok(DetectionOutcome::Complete(report))
        } else {
            warn!(
                completed = completed_zones.len(),
                skipped = skipped_zones.len(),
                scorer_skipped = scorer_cancelled,
                "Detection run cancelled; returning partial results"
            );
            Ok(DetectionOutcome::Partial {
                report,
                completed_zones,
                skipped_zones,
            })
        }
    }

    /// Scorer findings, the model trained on this batch (if any), and
    /// whether cancellation skipped the scorer.
    fn run_scorer(
        &self,
        table: &FeatureTable,
        cancel: &CancellationToken,
    ) -> Result<(Vec<AnomalyRecord>, Option<UnsupervisedScorer>, bool)> {
        if table.is_empty() {
            return Ok((Vec::new(), None, false));
        }
        match &self.scorer_mode {
            ScorerMode::Disabled => Ok((Vec::new(), None, false)),
            ScorerMode::TrainOnBatch => {
                if cancel.is_cancelled() {
                    return Ok((Vec::new(), None, true));
                }
                let mut scorer = UnsupervisedScorer::new(self.scorer_config.clone());
                scorer.train(
                    table,
                    self.scorer_config.normal_only,
                    self.scorer_config.contamination,
                    self.scorer_config.seed,
                )?;
                let records = scorer.detect(table)?;
                Ok((records, Some(scorer), false))
            }
            ScorerMode::Pretrained(scorer) => {
                if cancel.is_cancelled() {
                    return Ok((Vec::new(), None, true));
                }
                Ok((scorer.detect(table)?, None, false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::types::{Mode, RuleName};
    use chrono::{Duration, NaiveDate};

    /// `n` readings per zone; Z2 runs hot from sample 20 on.
    fn readings(zones: &[&str], n: i64) -> Vec<SensorReading> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date");
        let mut out = Vec::new();
        for zone in zones {
            for i in 0..n {
                let wobble = (i as f64 * 0.3).sin() * 0.2;
                let hot = *zone == "Z2" && i >= 20;
                out.push(SensorReading {
                    timestamp: start + Duration::minutes(5 * i),
                    zone_id: (*zone).to_string(),
                    ahu_id: "AHU1".to_string(),
                    temp_zone_c: 22.0 + wobble + if hot { 4.0 } else { 0.0 },
                    rh_zone_pct: 45.0,
                    supply_air_temp_c: 14.0,
                    return_air_temp_c: 23.0 + wobble,
                    power_kw: 7.0 + wobble,
                    fan_speed_pct: 60.0,
                    setpoint_c: 22.0,
                    mode: Mode::Cooling,
                    fault_type: Some(if hot { "temp_drift" } else { "none" }.to_string()),
                })
            }
        }
        out
    }

    fn orchestrator(mode: ScorerMode) -> DetectionOrchestrator {
        DetectionOrchestrator::new(&DetectionConfig::default()).with_scorer_mode(mode)
    }

    #[test]
    fn test_rules_only_run_is_complete() {
        let outcome = orchestrator(ScorerMode::Disabled)
            .run(readings(&["Z1", "Z2"], 60), &CancellationToken::new())
            .expect("run");
        assert!(outcome.is_complete());
        let report = outcome.report();
        assert_eq!(report.scorer_record_count, 0);
        assert_eq!(report.rows_processed, 120);
        let drift = &report.by_detector()[&RuleName::TempDrift];
        assert_eq!(drift.len(), 40);
        assert!(drift.iter().all(|r| r.zone_id == "Z2"));
    }

    #[test]
    fn test_train_on_batch_appends_scorer_findings() {
        let outcome = orchestrator(ScorerMode::TrainOnBatch)
            .run(readings(&["Z1", "Z2"], 60), &CancellationToken::new())
            .expect("run");
        let report = outcome.into_report();
        assert!(report.trained_model.as_ref().is_some_and(UnsupervisedScorer::is_trained));
        assert!(report.scorer_record_count > 0);
        assert!(report.rule_records().iter().all(|r| r.rule_name != RuleName::IsolationForest));
        assert!(report.scorer_records().iter().all(|r| r.rule_name == RuleName::IsolationForest));
    }

    #[test]
    fn test_pretrained_scorer_is_reused() {
        let orch = orchestrator(ScorerMode::TrainOnBatch);
        let first = orch
            .run(readings(&["Z1", "Z2"], 60), &CancellationToken::new())
            .expect("train run")
            .into_report();
        let model = first.trained_model.clone().expect("model");

        let second = orchestrator(ScorerMode::Pretrained(model))
            .run(readings(&["Z1", "Z2"], 60), &CancellationToken::new())
            .expect("scoring run")
            .into_report();
        assert!(second.trained_model.is_none());
        assert_eq!(second.records, first.records);
    }

    #[test]
    fn test_cancelled_run_is_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = orchestrator(ScorerMode::TrainOnBatch)
            .run(readings(&["Z1", "Z2"], 30), &cancel)
            .expect("run");
        match outcome {
            DetectionOutcome::Partial {
                report,
                completed_zones,
                skipped_zones,
            } => {
                assert!(completed_zones.is_empty());
                assert_eq!(skipped_zones, vec!["Z1".to_string(), "Z2".to_string()]);
                assert!(report.records.is_empty());
            }
            DetectionOutcome::Complete(_) => panic!("cancelled run claimed completeness"),
        }
    }

    #[test]
    fn test_cancel_after_rules_keeps_zone_findings() {
        let orch = orchestrator(ScorerMode::TrainOnBatch);
        let cancel = CancellationToken::new();
        let scan = orch.scan_zones(readings(&["Z1", "Z2"], 60), &cancel).expect("scan");
        cancel.cancel();

        match orch.finish(scan, &cancel).expect("run") {
            DetectionOutcome::Partial {
                report,
                completed_zones,
                skipped_zones,
            } => {
                assert_eq!(completed_zones, vec!["Z1".to_string(), "Z2".to_string()]);
                assert!(skipped_zones.is_empty());
                assert_eq!(report.rows_processed, 120);
                assert_eq!(report.rule_record_count, 40);
                assert!(report.rule_records().iter().all(|r| r.rule_name == RuleName::TempDrift));
                assert_eq!(report.scorer_record_count, 0);
                assert!(report.trained_model.is_none());
            }
            DetectionOutcome::Complete(_) => panic!("scorer was skipped but run claimed completeness"),
        }
    }

    #[test]
    fn test_ordering_error_aborts_run() {
        let mut input = readings(&["Z1"], 10);
        input.push(input[3].clone());
        let err = orchestrator(ScorerMode::Disabled)
            .run(input, &CancellationToken::new())
            .expect_err("duplicate timestamp");
        assert!(matches!(err, DetectionError::Ordering { .. }));
    }

    #[test]
    fn test_empty_batch_is_complete_and_empty() {
        let outcome = orchestrator(ScorerMode::TrainOnBatch)
            .run(Vec::new(), &CancellationToken::new())
            .expect("run");
        assert!(outcome.is_complete());
        assert!(outcome.report().records.is_empty());
        assert!(outcome.report().trained_model.is_none());
    }
}

//! Sustained setpoint deviation.
//!
//! Rows with `temp_error_c` above the threshold form runs; every row of a run
//! at least `min_duration_samples` long is reported. A run still open at the
//! end of the series is judged on its partial length.

use crate::config::TempDriftThresholds;
use crate::types::{columns, AnomalyRecord, FeatureRow, RuleName, Severity};

pub const REQUIRED_COLUMNS: &[&str] = &[columns::TEMP_ERROR_C];

const METRIC: &str = columns::TEMP_ZONE_C;

/// Scan one zone's rows (timestamp order).
pub fn scan(rows: &[FeatureRow], t: &TempDriftThresholds) -> Vec<AnomalyRecord> {
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, row) in rows.iter().enumerate() {
        let drifting = row.temp_error_c > t.threshold_c;
        match (drifting, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                emit_run(&rows[start..i], t, &mut out);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        emit_run(&rows[start..], t, &mut out);
    }
    out
}

fn emit_run(run: &[FeatureRow], t: &TempDriftThresholds, out: &mut Vec<AnomalyRecord>) {
    if run.len() < t.min_duration_samples {
        return;
    }
    out.extend(run.iter().map(|row| {
        let severity = if row.temp_error_c > t.high_error_c {
            Severity::High
        } else {
            Severity::Medium
        };
        let score = (row.temp_error_c.abs() / t.score_scale_c).min(t.score_cap);
        AnomalyRecord::from_row(row, RuleName::TempDrift, METRIC, score, severity)
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::zone_rows;

    fn with_errors(errors: &[f64]) -> Vec<FeatureRow> {
        zone_rows("Z1", errors.len())
            .into_iter()
            .zip(errors)
            .map(|(mut r, e)| {
                r.temp_error_c = *e;
                r
            })
            .collect()
    }

    #[test]
    fn test_five_samples_is_too_short() {
        let mut errors = vec![0.5; 4];
        errors.extend([4.5; 5]);
        errors.extend([0.5; 4]);
        let out = scan(&with_errors(&errors), &TempDriftThresholds::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_six_samples_flags_whole_run_as_medium() {
        let mut errors = vec![0.5; 4];
        errors.extend([4.5; 6]);
        errors.extend([0.5; 4]);
        let rows = with_errors(&errors);
        let out = scan(&rows, &TempDriftThresholds::default());
        assert_eq!(out.len(), 6);
        for (rec, row) in out.iter().zip(&rows[4..10]) {
            assert_eq!(rec.severity, Severity::Medium);
            assert_eq!(rec.rule_name, RuleName::TempDrift);
            assert_eq!(rec.metric, "temp_zone_c");
            assert_eq!(rec.timestamp, row.reading.timestamp);
            assert!((rec.score - 1.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_open_run_at_end_of_series() {
        let mut errors = vec![0.0; 3];
        errors.extend([6.0, 6.0, 12.0, 6.0, 6.0, 6.0]);
        let out = scan(&with_errors(&errors), &TempDriftThresholds::default());
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|r| r.severity == Severity::High));
        // 12 / 3 = 4 is capped
        assert_eq!(out[2].score, 3.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let out = scan(&with_errors(&[3.0; 10]), &TempDriftThresholds::default());
        assert!(out.is_empty());
    }
}

//! Hunting control loop: the zone temperature keeps reversing direction.
//!
//! A window slides over the zone's `temp_change_rate` sequence. When the
//! number of sign changes inside it exceeds the limit, every row of the window
//! is reported and the scan resumes after the window; otherwise the window
//! advances by one row. Zero is its own sign class, so a move to or from a
//! flat step counts as a change.

use crate::config::OscillatingControlThresholds;
use crate::types::{columns, AnomalyRecord, FeatureRow, RuleName, Severity};

pub const REQUIRED_COLUMNS: &[&str] = &[columns::TEMP_CHANGE_RATE];

const METRIC: &str = columns::TEMP_ZONE_C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Negative,
    Zero,
    Positive,
}

fn sign(v: f64) -> Sign {
    if v > 0.0 {
        Sign::Positive
    } else if v < 0.0 {
        Sign::Negative
    } else {
        Sign::Zero
    }
}

/// Number of adjacent pairs whose signs differ.
pub fn sign_changes(rates: impl IntoIterator<Item = f64>) -> usize {
    let signs: Vec<Sign> = rates.into_iter().map(sign).collect();
    signs.windows(2).filter(|w| w[0] != w[1]).count()
}

pub fn scan(rows: &[FeatureRow], t: &OscillatingControlThresholds) -> Vec<AnomalyRecord> {
    let window = t.window_samples;
    let mut out = Vec::new();
    if window == 0 || rows.len() < window {
        return out;
    }

    let mut i = 0;
    while i + window <= rows.len() {
        let slice = &rows[i..i + window];
        if sign_changes(slice.iter().map(|r| r.temp_change_rate)) > t.max_sign_changes {
            out.extend(slice.iter().map(|r| {
                AnomalyRecord::from_row(r, RuleName::OscillatingControl, METRIC, t.score, Severity::Medium)
            }));
            i += window;
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::zone_rows;

    fn with_rates(rates: &[f64]) -> Vec<FeatureRow> {
        zone_rows("Z1", rates.len())
            .into_iter()
            .zip(rates)
            .map(|(mut r, v)| {
                r.temp_change_rate = *v;
                r
            })
            .collect()
    }

    fn alternating(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 0.3 } else { -0.3 }).collect()
    }

    #[test]
    fn test_sign_change_counting() {
        assert_eq!(sign_changes(alternating(12)), 11);
        assert_eq!(sign_changes([1.0, 0.0, 1.0]), 2);
        assert_eq!(sign_changes([1.0, 2.0, 3.0]), 0);
        assert_eq!(sign_changes(std::iter::empty()), 0);
    }

    #[test]
    fn test_alternating_window_is_flagged_entirely() {
        let rows = with_rates(&alternating(12));
        let out = scan(&rows, &OscillatingControlThresholds::default());
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|r| r.severity == Severity::Medium && r.score == 2.0));
        assert_eq!(out[0].timestamp, rows[0].reading.timestamp);
        assert_eq!(out[11].timestamp, rows[11].reading.timestamp);
    }

    #[test]
    fn test_two_sign_changes_not_flagged() {
        let mut rates = vec![0.1; 4];
        rates.extend([-0.1; 4]);
        rates.extend([0.1; 4]);
        assert_eq!(sign_changes(rates.iter().copied()), 2);
        assert!(scan(&with_rates(&rates), &OscillatingControlThresholds::default()).is_empty());
    }

    #[test]
    fn test_skip_ahead_after_detection() {
        // 18 alternating rows: first window flagged, the scan resumes at row 12
        // where only 6 rows remain, fewer than a window
        let rows = with_rates(&alternating(18));
        let out = scan(&rows, &OscillatingControlThresholds::default());
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_short_series_is_ignored() {
        assert!(scan(&with_rates(&alternating(11)), &OscillatingControlThresholds::default()).is_empty());
    }
}

//! Fan working against a restricted filter: high instantaneous fan speed
//! backed by a high short-window average.

use crate::config::CloggedFilterThresholds;
use crate::types::{columns, AnomalyRecord, FeatureRow, RuleName, Severity};

pub const REQUIRED_COLUMNS: &[&str] = &[columns::FAN_SPEED_PCT, columns::FAN_ROLLING_MEAN_SHORT];

const METRIC: &str = columns::FAN_SPEED_PCT;

pub fn scan(rows: &[FeatureRow], t: &CloggedFilterThresholds) -> Vec<AnomalyRecord> {
    rows.iter()
        .filter(|r| {
            r.reading.fan_speed_pct > t.fan_speed_pct && r.fan_rolling_mean_short > t.fan_rolling_mean_pct
        })
        .map(|r| {
            let severity = if r.reading.fan_speed_pct > t.high_fan_speed_pct {
                Severity::High
            } else {
                Severity::Medium
            };
            AnomalyRecord::from_row(r, RuleName::CloggedFilter, METRIC, t.score, severity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::zone_rows;

    fn rows(fan: &[(f64, f64)]) -> Vec<FeatureRow> {
        zone_rows("Z1", fan.len())
            .into_iter()
            .zip(fan)
            .map(|(mut r, (speed, mean))| {
                r.reading.fan_speed_pct = *speed;
                r.fan_rolling_mean_short = *mean;
                r
            })
            .collect()
    }

    #[test]
    fn test_both_conditions_required() {
        let input = rows(&[(75.0, 60.0), (75.0, 68.0), (69.0, 72.0), (85.0, 80.0)]);
        let out = scan(&input, &CloggedFilterThresholds::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, input[1].reading.timestamp);
        assert_eq!(out[0].severity, Severity::Medium);
        assert_eq!(out[1].severity, Severity::High);
        assert!(out.iter().all(|r| r.score == 2.0 && r.metric == "fan_speed_pct"));
    }

    #[test]
    fn test_boundary_values_not_flagged() {
        let out = scan(&rows(&[(70.0, 80.0), (90.0, 65.0)]), &CloggedFilterThresholds::default());
        assert!(out.is_empty());
    }
}

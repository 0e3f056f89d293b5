//! Compressor not running while the zone calls for cooling.
//!
//! Low instantaneous and hour-average power draw while the zone sits above
//! setpoint in cooling mode. Always high severity.

use crate::config::CompressorFailureThresholds;
use crate::types::{columns, AnomalyRecord, FeatureRow, Mode, RuleName, Severity};

pub const REQUIRED_COLUMNS: &[&str] = &[
    columns::POWER_KW,
    columns::TEMP_ERROR_C,
    columns::POWER_ROLLING_MEAN_LONG,
];

const METRIC: &str = columns::POWER_KW;

pub fn scan(rows: &[FeatureRow], t: &CompressorFailureThresholds) -> Vec<AnomalyRecord> {
    rows.iter()
        .filter(|r| {
            r.reading.mode == Mode::Cooling
                && r.reading.power_kw < t.power_kw_max
                && r.temp_error_c > t.temp_error_min_c
                && r.power_rolling_mean_long < t.power_rolling_mean_max
        })
        .map(|r| AnomalyRecord::from_row(r, RuleName::CompressorFailure, METRIC, t.score, Severity::High))
        .collect()
}

//! Feature Engineering
//!
//! Turns zone sensor readings into diagnostic feature rows, 1:1 with input.
//!
//! ## Architecture
//!
//! Zones share nothing, so each zone is an independent unit of work:
//!
//! 1. Sort the zone's readings by timestamp; duplicates are an ordering error
//! 2. Point features: setpoint error, return/supply delta
//! 3. Trailing rolling mean/std (short and long windows) of temp error,
//!    power and fan speed via [`rolling::RollingWindow`]
//! 4. One-step lags and first differences with back-filled first rows
//! 5. Optional rounding of the derived columns
//!
//! Zones run on the rayon pool and are merged in lexicographic zone order,
//! so output never depends on scheduling.

pub mod cleaning;
pub mod rolling;

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{self, FeatureConfig};
use crate::error::{DetectionError, Result};
use crate::types::{FeatureRow, FeatureTable, SensorReading};

use rolling::{first_difference, lag1, rolling};

/// Readings of one zone, keyed by zone id in lexicographic order.
pub type ZoneBatches = BTreeMap<String, Vec<SensorReading>>;

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(config::get().features.clone())
    }
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Split readings by zone. Input order within a zone is kept.
    pub fn group_by_zone(readings: Vec<SensorReading>) -> ZoneBatches {
        let mut zones = ZoneBatches::new();
        for r in readings {
            zones.entry(r.zone_id.clone()).or_default().push(r);
        }
        zones
    }

    /// Compute features for a whole batch.
    ///
    /// Output is ordered by zone, then timestamp. If several zones have
    /// duplicate timestamps, the error reports the first such zone.
    pub fn compute(&self, readings: Vec<SensorReading>) -> Result<FeatureTable> {
        let zones: Vec<(String, Vec<SensorReading>)> =
            Self::group_by_zone(readings).into_iter().collect();
        let zone_count = zones.len();

        let per_zone: Vec<Result<Vec<FeatureRow>>> = zones
            .into_par_iter()
            .map(|(zone, rows)| self.compute_zone(&zone, rows))
            .collect();

        let mut rows = Vec::new();
        for zone_rows in per_zone {
            rows.extend(zone_rows?);
        }

        info!(zones = zone_count, rows = rows.len(), "Features computed");
        Ok(FeatureTable::new(rows))
    }

    /// Compute features for the readings of a single zone.
    pub fn compute_zone(&self, zone: &str, mut readings: Vec<SensorReading>) -> Result<Vec<FeatureRow>> {
        readings.sort_by_key(|r| r.timestamp);

        if let Some(pair) = readings.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(DetectionError::Ordering {
                zone: zone.to_string(),
                timestamp: pair[0].timestamp,
            });
        }
        self.check_spacing(zone, &readings);

        let temp_error: Vec<f64> = readings.iter().map(|r| r.temp_zone_c - r.setpoint_c).collect();
        let power: Vec<f64> = readings.iter().map(|r| r.power_kw).collect();
        let fan: Vec<f64> = readings.iter().map(|r| r.fan_speed_pct).collect();
        let temp: Vec<f64> = readings.iter().map(|r| r.temp_zone_c).collect();

        let (short, long) = (self.config.short_window, self.config.long_window);
        let te_short = rolling(temp_error.iter().copied(), short);
        let te_long = rolling(temp_error.iter().copied(), long);
        let pw_short = rolling(power.iter().copied(), short);
        let pw_long = rolling(power.iter().copied(), long);
        let fan_short = rolling(fan.iter().copied(), short);
        let fan_long = rolling(fan.iter().copied(), long);

        let temp_lag = lag1(&temp);
        let power_lag = lag1(&power);
        let fan_lag = lag1(&fan);
        let temp_rate = first_difference(&temp);
        let power_rate = first_difference(&power);

        let rows = readings
            .into_iter()
            .zip(te_short.zip(te_long))
            .zip(pw_short.zip(pw_long))
            .zip(fan_short.zip(fan_long))
            .enumerate()
            .map(|(i, (((reading, (tes, tel)), (pws, pwl)), (fs, fl)))| {
                let row = FeatureRow {
                    temp_error_c: temp_error[i],
                    delta_return_supply: reading.return_air_temp_c - reading.supply_air_temp_c,
                    temp_error_rolling_mean_short: tes.mean,
                    temp_error_rolling_std_short: tes.std,
                    temp_error_rolling_mean_long: tel.mean,
                    temp_error_rolling_std_long: tel.std,
                    power_rolling_mean_short: pws.mean,
                    power_rolling_std_short: pws.std,
                    power_rolling_mean_long: pwl.mean,
                    power_rolling_std_long: pwl.std,
                    fan_rolling_mean_short: fs.mean,
                    fan_rolling_std_short: fs.std,
                    fan_rolling_mean_long: fl.mean,
                    fan_rolling_std_long: fl.std,
                    temp_zone_c_lag1: temp_lag[i],
                    power_kw_lag1: power_lag[i],
                    fan_speed_pct_lag1: fan_lag[i],
                    temp_change_rate: temp_rate[i],
                    power_change_rate: power_rate[i],
                    reading,
                };
                if self.config.round_output {
                    round_derived(row, self.config.round_decimals)
                } else {
                    row
                }
            })
            .collect::<Vec<_>>();

        debug!(zone = %zone, rows = rows.len(), "Zone features computed");
        Ok(rows)
    }

    /// Log gaps that do not match the configured sampling interval.
    fn check_spacing(&self, zone: &str, readings: &[SensorReading]) {
        let expected = chrono::Duration::minutes(i64::from(self.config.sample_interval_minutes));
        let irregular = readings
            .windows(2)
            .filter(|w| w[1].timestamp - w[0].timestamp != expected)
            .count();
        if irregular > 0 {
            warn!(
                zone = %zone,
                irregular_gaps = irregular,
                expected_minutes = self.config.sample_interval_minutes,
                "Irregular sample spacing; window lengths are in samples, not minutes"
            );
        }
    }
}

/// Round a value to `decimals` places. Non-finite input is left as is.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

fn round_derived(mut row: FeatureRow, decimals: u32) -> FeatureRow {
    for v in [
        &mut row.temp_error_c,
        &mut row.delta_return_supply,
        &mut row.temp_error_rolling_mean_short,
        &mut row.temp_error_rolling_std_short,
        &mut row.temp_error_rolling_mean_long,
        &mut row.temp_error_rolling_std_long,
        &mut row.power_rolling_mean_short,
        &mut row.power_rolling_std_short,
        &mut row.power_rolling_mean_long,
        &mut row.power_rolling_std_long,
        &mut row.fan_rolling_mean_short,
        &mut row.fan_rolling_std_short,
        &mut row.fan_rolling_mean_long,
        &mut row.fan_rolling_std_long,
        &mut row.temp_zone_c_lag1,
        &mut row.power_kw_lag1,
        &mut row.fan_speed_pct_lag1,
        &mut row.temp_change_rate,
        &mut row.power_change_rate,
    ] {
        *v = round_to(*v, decimals);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{columns, Mode};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date")
            + chrono::Duration::minutes(minutes)
    }

    fn reading(zone: &str, minutes: i64, temp: f64, power: f64) -> SensorReading {
        SensorReading {
            timestamp: ts(minutes),
            zone_id: zone.to_string(),
            ahu_id: "AHU1".to_string(),
            temp_zone_c: temp,
            rh_zone_pct: 45.0,
            supply_air_temp_c: 14.0,
            return_air_temp_c: 23.5,
            power_kw: power,
            fan_speed_pct: 60.0,
            setpoint_c: 22.0,
            mode: Mode::Cooling,
            fault_type: None,
        }
    }

    #[test]
    fn test_output_is_one_to_one_and_zone_ordered() {
        let input = vec![
            reading("Z2", 0, 22.0, 7.0),
            reading("Z1", 5, 23.0, 7.5),
            reading("Z1", 0, 22.5, 7.0),
        ];
        let table = FeatureEngineer::new(FeatureConfig::default())
            .compute(input)
            .expect("compute");
        assert_eq!(table.len(), 3);
        let keys: Vec<(&str, NaiveDateTime)> = table
            .rows()
            .iter()
            .map(|r| (r.zone_id(), r.reading.timestamp))
            .collect();
        assert_eq!(keys, vec![("Z1", ts(0)), ("Z1", ts(5)), ("Z2", ts(0))]);
    }

    #[test]
    fn test_point_features_and_edges() {
        let input = vec![
            reading("Z1", 0, 22.0, 7.0),
            reading("Z1", 5, 23.0, 8.0),
            reading("Z1", 10, 25.0, 6.0),
        ];
        let table = FeatureEngineer::new(FeatureConfig::default())
            .compute(input)
            .expect("compute");
        let rows = table.rows();

        assert_eq!(rows[2].temp_error_c, 3.0);
        assert_eq!(rows[0].delta_return_supply, 9.5);

        // lag: first row borrows its own value
        assert_eq!(rows[0].temp_zone_c_lag1, 22.0);
        assert_eq!(rows[2].temp_zone_c_lag1, 23.0);
        // difference: first row borrows the second difference
        assert_eq!(rows[0].temp_change_rate, 1.0);
        assert_eq!(rows[1].temp_change_rate, 1.0);
        assert_eq!(rows[2].temp_change_rate, 2.0);
        assert_eq!(rows[2].power_change_rate, -2.0);

        // single-sample window has zero std
        assert_eq!(rows[0].power_rolling_std_short, 0.0);
        assert_eq!(rows[2].power_rolling_mean_short, 7.0);
        assert_eq!(rows[2].power_rolling_std_short, 1.0);
    }

    #[test]
    fn test_duplicate_timestamp_is_ordering_error() {
        let input = vec![
            reading("Z1", 0, 22.0, 7.0),
            reading("Z1", 0, 22.5, 7.0),
        ];
        let err = FeatureEngineer::new(FeatureConfig::default())
            .compute(input)
            .expect_err("duplicate timestamp");
        assert!(matches!(err, DetectionError::Ordering { ref zone, .. } if zone == "Z1"));
    }

    #[test]
    fn test_first_failing_zone_is_reported() {
        let input = vec![
            reading("Z3", 0, 22.0, 7.0),
            reading("Z3", 0, 22.0, 7.0),
            reading("Z2", 5, 22.0, 7.0),
            reading("Z2", 5, 22.0, 7.0),
            reading("Z1", 0, 22.0, 7.0),
        ];
        let err = FeatureEngineer::new(FeatureConfig::default())
            .compute(input)
            .expect_err("duplicates");
        assert!(matches!(err, DetectionError::Ordering { ref zone, .. } if zone == "Z2"));
    }

    #[test]
    fn test_rounding_is_applied_to_derived_columns() {
        let input = vec![
            reading("Z1", 0, 22.0, 7.0),
            reading("Z1", 5, 22.0, 7.1),
            reading("Z1", 10, 22.0, 7.3),
        ];
        let table = FeatureEngineer::new(FeatureConfig::default())
            .compute(input)
            .expect("compute");
        for row in table.rows() {
            for c in columns::ALL {
                let v = row.value(c).expect("known column");
                assert_eq!(v, round_to(v, 4), "{c} not rounded");
            }
        }
    }

    #[test]
    fn test_empty_input_yields_empty_table() {
        let table = FeatureEngineer::new(FeatureConfig::default())
            .compute(Vec::new())
            .expect("empty input is fine");
        assert!(table.is_empty());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_56, 4), 1.2346);
        assert_eq!(round_to(-0.000_04, 4), -0.0);
        assert!(round_to(f64::NAN, 4).is_nan());
    }
}

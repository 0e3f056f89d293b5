//! Feature table: one derived row per sensor reading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::reading::SensorReading;
use crate::error::{DetectionError, Result};

/// Names of the numeric feature columns, in table order.
///
/// Raw reading columns come first, derived columns after. The scorer and the
/// rule engine address columns by these names.
pub mod columns {
    pub const TEMP_ZONE_C: &str = "temp_zone_c";
    pub const RH_ZONE_PCT: &str = "rh_zone_pct";
    pub const SUPPLY_AIR_TEMP_C: &str = "supply_air_temp_c";
    pub const RETURN_AIR_TEMP_C: &str = "return_air_temp_c";
    pub const POWER_KW: &str = "power_kw";
    pub const FAN_SPEED_PCT: &str = "fan_speed_pct";
    pub const SETPOINT_C: &str = "setpoint_c";

    pub const TEMP_ERROR_C: &str = "temp_error_c";
    pub const DELTA_RETURN_SUPPLY: &str = "delta_return_supply";
    pub const TEMP_ERROR_ROLLING_MEAN_SHORT: &str = "temp_error_rolling_mean_short";
    pub const TEMP_ERROR_ROLLING_STD_SHORT: &str = "temp_error_rolling_std_short";
    pub const TEMP_ERROR_ROLLING_MEAN_LONG: &str = "temp_error_rolling_mean_long";
    pub const TEMP_ERROR_ROLLING_STD_LONG: &str = "temp_error_rolling_std_long";
    pub const POWER_ROLLING_MEAN_SHORT: &str = "power_rolling_mean_short";
    pub const POWER_ROLLING_STD_SHORT: &str = "power_rolling_std_short";
    pub const POWER_ROLLING_MEAN_LONG: &str = "power_rolling_mean_long";
    pub const POWER_ROLLING_STD_LONG: &str = "power_rolling_std_long";
    pub const FAN_ROLLING_MEAN_SHORT: &str = "fan_rolling_mean_short";
    pub const FAN_ROLLING_STD_SHORT: &str = "fan_rolling_std_short";
    pub const FAN_ROLLING_MEAN_LONG: &str = "fan_rolling_mean_long";
    pub const FAN_ROLLING_STD_LONG: &str = "fan_rolling_std_long";
    pub const TEMP_ZONE_C_LAG1: &str = "temp_zone_c_lag1";
    pub const POWER_KW_LAG1: &str = "power_kw_lag1";
    pub const FAN_SPEED_PCT_LAG1: &str = "fan_speed_pct_lag1";
    pub const TEMP_CHANGE_RATE: &str = "temp_change_rate";
    pub const POWER_CHANGE_RATE: &str = "power_change_rate";

    /// Every numeric column a fully engineered table carries.
    pub const ALL: [&str; 26] = [
        TEMP_ZONE_C,
        RH_ZONE_PCT,
        SUPPLY_AIR_TEMP_C,
        RETURN_AIR_TEMP_C,
        POWER_KW,
        FAN_SPEED_PCT,
        SETPOINT_C,
        TEMP_ERROR_C,
        DELTA_RETURN_SUPPLY,
        TEMP_ERROR_ROLLING_MEAN_SHORT,
        TEMP_ERROR_ROLLING_STD_SHORT,
        TEMP_ERROR_ROLLING_MEAN_LONG,
        TEMP_ERROR_ROLLING_STD_LONG,
        POWER_ROLLING_MEAN_SHORT,
        POWER_ROLLING_STD_SHORT,
        POWER_ROLLING_MEAN_LONG,
        POWER_ROLLING_STD_LONG,
        FAN_ROLLING_MEAN_SHORT,
        FAN_ROLLING_STD_SHORT,
        FAN_ROLLING_MEAN_LONG,
        FAN_ROLLING_STD_LONG,
        TEMP_ZONE_C_LAG1,
        POWER_KW_LAG1,
        FAN_SPEED_PCT_LAG1,
        TEMP_CHANGE_RATE,
        POWER_CHANGE_RATE,
    ];

    /// Identity fields every feature record must carry.
    pub const IDENTITY: [&str; 4] = ["timestamp", "zone_id", "ahu_id", "mode"];
}

/// A sensor reading enriched with diagnostic features.
///
/// Rolling statistics are trailing (current and past samples only). "short"
/// is the 3-sample window (~15 min), "long" the 12-sample window (~60 min).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    #[serde(flatten)]
    pub reading: SensorReading,

    /// temp_zone_c - setpoint_c
    pub temp_error_c: f64,
    /// return_air_temp_c - supply_air_temp_c
    pub delta_return_supply: f64,

    pub temp_error_rolling_mean_short: f64,
    pub temp_error_rolling_std_short: f64,
    pub temp_error_rolling_mean_long: f64,
    pub temp_error_rolling_std_long: f64,

    pub power_rolling_mean_short: f64,
    pub power_rolling_std_short: f64,
    pub power_rolling_mean_long: f64,
    pub power_rolling_std_long: f64,

    pub fan_rolling_mean_short: f64,
    pub fan_rolling_std_short: f64,
    pub fan_rolling_mean_long: f64,
    pub fan_rolling_std_long: f64,

    pub temp_zone_c_lag1: f64,
    pub power_kw_lag1: f64,
    pub fan_speed_pct_lag1: f64,

    /// First difference of zone temperature
    pub temp_change_rate: f64,
    /// First difference of power draw
    pub power_change_rate: f64,
}

impl FeatureRow {
    pub fn zone_id(&self) -> &str {
        &self.reading.zone_id
    }

    /// Look up a numeric column by name.
    pub fn value(&self, column: &str) -> Option<f64> {
        use columns::*;
        let r = &self.reading;
        let v = match column {
            TEMP_ZONE_C => r.temp_zone_c,
            RH_ZONE_PCT => r.rh_zone_pct,
            SUPPLY_AIR_TEMP_C => r.supply_air_temp_c,
            RETURN_AIR_TEMP_C => r.return_air_temp_c,
            POWER_KW => r.power_kw,
            FAN_SPEED_PCT => r.fan_speed_pct,
            SETPOINT_C => r.setpoint_c,
            TEMP_ERROR_C => self.temp_error_c,
            DELTA_RETURN_SUPPLY => self.delta_return_supply,
            TEMP_ERROR_ROLLING_MEAN_SHORT => self.temp_error_rolling_mean_short,
            TEMP_ERROR_ROLLING_STD_SHORT => self.temp_error_rolling_std_short,
            TEMP_ERROR_ROLLING_MEAN_LONG => self.temp_error_rolling_mean_long,
            TEMP_ERROR_ROLLING_STD_LONG => self.temp_error_rolling_std_long,
            POWER_ROLLING_MEAN_SHORT => self.power_rolling_mean_short,
            POWER_ROLLING_STD_SHORT => self.power_rolling_std_short,
            POWER_ROLLING_MEAN_LONG => self.power_rolling_mean_long,
            POWER_ROLLING_STD_LONG => self.power_rolling_std_long,
            FAN_ROLLING_MEAN_SHORT => self.fan_rolling_mean_short,
            FAN_ROLLING_STD_SHORT => self.fan_rolling_std_short,
            FAN_ROLLING_MEAN_LONG => self.fan_rolling_mean_long,
            FAN_ROLLING_STD_LONG => self.fan_rolling_std_long,
            TEMP_ZONE_C_LAG1 => self.temp_zone_c_lag1,
            POWER_KW_LAG1 => self.power_kw_lag1,
            FAN_SPEED_PCT_LAG1 => self.fan_speed_pct_lag1,
            TEMP_CHANGE_RATE => self.temp_change_rate,
            POWER_CHANGE_RATE => self.power_change_rate,
            _ => return None,
        };
        Some(v)
    }

    /// All numeric columns in `columns::ALL` order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        columns::ALL.iter().filter_map(move |c| self.value(c))
    }
}

/// Feature rows ordered by zone, then timestamp, plus the columns available.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
    columns: BTreeSet<String>,
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeatureTable {
    /// Wrap engineered rows. Every column is available.
    ///
    /// Rows are put in zone, then timestamp order so each zone is one
    /// contiguous run; the sort is stable.
    pub fn new(mut rows: Vec<FeatureRow>) -> Self {
        sort_zone_major(&mut rows);
        Self {
            rows,
            columns: columns::ALL.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Rebuild a table from externally supplied JSON feature records.
    ///
    /// Identity fields are mandatory on every record. A numeric column is
    /// available only if every record carries it; absent values are held as
    /// 0.0 and any stage that needs the column fails with a schema error.
    pub fn from_records(records: Vec<serde_json::Value>) -> Result<Self> {
        let mut available: BTreeSet<String> =
            columns::ALL.iter().map(|c| (*c).to_string()).collect();

        let mut rows = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let serde_json::Value::Object(mut map) = record else {
                return Err(DetectionError::missing_field_at("timestamp", idx));
            };
            for field in columns::IDENTITY {
                if map.get(field).map_or(true, serde_json::Value::is_null) {
                    return Err(DetectionError::missing_field_at(field, idx));
                }
            }
            for column in columns::ALL {
                if map.get(column).map_or(true, serde_json::Value::is_null) {
                    available.remove(column);
                    map.insert(column.to_string(), serde_json::Value::from(0.0));
                }
            }
            let row: FeatureRow = serde_json::from_value(serde_json::Value::Object(map))?;
            rows.push(row);
        }

        sort_zone_major(&mut rows);

        Ok(Self {
            rows,
            columns: available,
        })
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FeatureRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Fail with a schema error naming the first required column not present.
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        match required.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(DetectionError::missing_field(*missing)),
            None => Ok(()),
        }
    }

    /// Contiguous per-zone slices, in table order.
    pub fn zones(&self) -> Vec<(&str, &[FeatureRow])> {
        let mut out = Vec::new();
        let mut start = 0;
        for i in 1..=self.rows.len() {
            if i == self.rows.len() || self.rows[i].zone_id() != self.rows[start].zone_id() {
                out.push((self.rows[start].zone_id(), &self.rows[start..i]));
                start = i;
            }
        }
        out
    }
}

fn sort_zone_major(rows: &mut [FeatureRow]) {
    rows.sort_by(|a, b| {
        a.reading
            .zone_id
            .cmp(&b.reading.zone_id)
            .then(a.reading.timestamp.cmp(&b.reading.timestamp))
    });
}

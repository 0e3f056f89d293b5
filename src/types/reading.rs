//! Zone sensor readings: the validated form and the raw boundary form.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Operating mode of the zone's air handler at sample time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Cooling,
    Off,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Cooling => write!(f, "cooling"),
            Mode::Off => write!(f, "off"),
        }
    }
}

/// Label carried through to anomaly records when a reading has no ground truth.
pub const UNKNOWN_FAULT_LABEL: &str = "unknown";

/// Ground-truth label of readings recorded under normal operation.
pub const NORMAL_FAULT_LABEL: &str = "none";

/// One zone sample at one timestamp.
///
/// Within a zone, readings are evenly spaced at the sampling interval
/// (5 minutes in the reference deployment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub zone_id: String,
    pub ahu_id: String,
    /// Zone air temperature (°C)
    pub temp_zone_c: f64,
    /// Zone relative humidity (%)
    pub rh_zone_pct: f64,
    /// Supply air temperature leaving the AHU (°C)
    pub supply_air_temp_c: f64,
    /// Return air temperature (°C)
    pub return_air_temp_c: f64,
    /// Electrical power draw (kW)
    pub power_kw: f64,
    /// Supply fan speed (% of max)
    pub fan_speed_pct: f64,
    /// Zone temperature setpoint (°C)
    pub setpoint_c: f64,
    pub mode: Mode,
    /// Ground-truth fault label. Evaluation only; detectors never read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_type: Option<String>,
}

impl SensorReading {
    /// Label passed through to anomaly records.
    pub fn fault_label(&self) -> &str {
        self.fault_type.as_deref().unwrap_or(UNKNOWN_FAULT_LABEL)
    }

    /// True when the reading carries the "none" ground-truth label.
    pub fn is_labelled_normal(&self) -> bool {
        self.fault_type.as_deref() == Some(NORMAL_FAULT_LABEL)
    }
}

/// A reading as it arrives from the collection side, before validation.
///
/// Every field is optional. `timestamp`, `zone_id` and `temp_zone_c` are
/// mandatory for validation; the others may be forward-filled within a zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawReading {
    #[serde(with = "timestamp_format::option")]
    pub timestamp: Option<NaiveDateTime>,
    pub zone_id: Option<String>,
    pub ahu_id: Option<String>,
    pub temp_zone_c: Option<f64>,
    pub rh_zone_pct: Option<f64>,
    pub supply_air_temp_c: Option<f64>,
    pub return_air_temp_c: Option<f64>,
    pub power_kw: Option<f64>,
    pub fan_speed_pct: Option<f64>,
    pub setpoint_c: Option<f64>,
    pub mode: Option<Mode>,
    pub fault_type: Option<String>,
}

impl From<SensorReading> for RawReading {
    fn from(r: SensorReading) -> Self {
        Self {
            timestamp: Some(r.timestamp),
            zone_id: Some(r.zone_id),
            ahu_id: Some(r.ahu_id),
            temp_zone_c: Some(r.temp_zone_c),
            rh_zone_pct: Some(r.rh_zone_pct),
            supply_air_temp_c: Some(r.supply_air_temp_c),
            return_air_temp_c: Some(r.return_air_temp_c),
            power_kw: Some(r.power_kw),
            fan_speed_pct: Some(r.fan_speed_pct),
            setpoint_c: Some(r.setpoint_c),
            mode: Some(r.mode),
            fault_type: r.fault_type,
        }
    }
}

/// Timestamps are accepted as ISO-8601 (`2024-01-01T09:05:00`) or with a
/// space separator (`2024-01-01 09:05:00`), the layout most exports use.
/// They are always written back in ISO-8601.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
    }

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw {
                None => Ok(None),
                Some(s) => super::parse(&s).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp '{s}'"))
                }),
            }
        }
    }
}

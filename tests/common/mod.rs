//! Shared synthetic building: three zones, two days at 5-minute sampling.
//!
//! - Occupied hours (08:00-18:00) run in cooling mode, fan near 60 %
//! - Nights run with the compressor off and the fan near 30 %
//! - Zone temperature follows a smooth daily curve within 0.5 °C of setpoint
//! - Z2 carries a clogged-filter episode on day two: the fan ramps from its
//!   baseline to +20 % between 10:00 and 14:00

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use hvac_sentinel::types::{Mode, RawReading, SensorReading};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub const ZONES: [(&str, &str); 3] = [("Z1", "AHU1"), ("Z2", "AHU1"), ("Z3", "AHU2")];
pub const SAMPLES_PER_ZONE: i64 = 2 * 24 * 12;
pub const EPISODE_ZONE: &str = "Z2";
pub const EPISODE_SAMPLES: i64 = 48;

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 8)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid start")
}

pub fn episode_start() -> NaiveDateTime {
    start() + Duration::hours(24 + 10)
}

pub fn episode_end() -> NaiveDateTime {
    episode_start() + Duration::minutes(5 * (EPISODE_SAMPLES - 1))
}

pub fn in_episode(zone: &str, ts: NaiveDateTime) -> bool {
    zone == EPISODE_ZONE && ts >= episode_start() && ts <= episode_end()
}

/// The full fixture, ordered by zone then timestamp.
pub fn readings() -> Vec<SensorReading> {
    let mut rng = StdRng::seed_from_u64(2024);
    let fan_noise = Normal::new(0.0, 1.5).expect("valid distribution");
    let power_noise = Normal::new(0.0, 0.3).expect("valid distribution");
    let air_noise = Normal::new(0.0, 0.2).expect("valid distribution");
    let rh_noise = Normal::new(0.0, 2.0).expect("valid distribution");

    let mut out = Vec::new();
    for (zone, ahu) in ZONES {
        for i in 0..SAMPLES_PER_ZONE {
            let ts = start() + Duration::minutes(5 * i);
            let occupied = (8..18).contains(&ts.hour());
            let day_phase = (i % (24 * 12)) as f64 / (24.0 * 12.0);
            let temp = 22.0 + 0.5 * (std::f64::consts::TAU * day_phase).sin();

            let (mode, fan_base, power_base) = if occupied {
                (Mode::Cooling, 60.0, 7.0)
            } else {
                (Mode::Off, 30.0, 3.5)
            };
            let episode = in_episode(zone, ts);
            let ramp = if episode {
                let k = (ts - episode_start()).num_minutes() / 5;
                20.0 * k as f64 / (EPISODE_SAMPLES - 1) as f64
            } else {
                0.0
            };

            out.push(SensorReading {
                timestamp: ts,
                zone_id: zone.to_string(),
                ahu_id: ahu.to_string(),
                temp_zone_c: temp,
                rh_zone_pct: 45.0 + rh_noise.sample(&mut rng),
                supply_air_temp_c: 14.0 + air_noise.sample(&mut rng),
                return_air_temp_c: temp + 1.0 + air_noise.sample(&mut rng),
                power_kw: power_base + power_noise.sample(&mut rng),
                fan_speed_pct: fan_base + ramp + fan_noise.sample(&mut rng),
                setpoint_c: 22.0,
                mode,
                fault_type: Some(if episode { "clogged_filter" } else { "none" }.to_string()),
            });
        }
    }
    out
}

pub fn raw_readings() -> Vec<RawReading> {
    readings().into_iter().map(RawReading::from).collect()
}

/// Readings as JSON Lines, the CLI input format.
pub fn to_jsonl(readings: &[SensorReading]) -> String {
    readings
        .iter()
        .map(|r| serde_json::to_string(r).expect("serializable reading"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub const SLOW_RAMP_SAMPLES: i64 = 8 * 12;

/// Start of the slow ramp: day two, 08:00.
pub fn slow_ramp_start() -> NaiveDateTime {
    start() + Duration::hours(24 + 8)
}

pub fn in_slow_ramp(ts: NaiveDateTime) -> bool {
    ts >= slow_ramp_start()
        && ts < slow_ramp_start() + Duration::minutes(5 * SLOW_RAMP_SAMPLES)
}

/// Same three zones with the fan near 40 % while occupied. In
/// `EPISODE_ZONE` the fan climbs from 40 % to 70 % over eight hours on day
/// two. Fan jitter is a bounded ±1.5 % sine so the crossings are fixed.
pub fn slow_ramp_readings() -> Vec<SensorReading> {
    let mut out = Vec::new();
    for (zone, ahu) in ZONES {
        for i in 0..SAMPLES_PER_ZONE {
            let ts = start() + Duration::minutes(5 * i);
            let occupied = (8..18).contains(&ts.hour());
            let day_phase = (i % (24 * 12)) as f64 / (24.0 * 12.0);
            let temp = 22.0 + 0.5 * (std::f64::consts::TAU * day_phase).sin();

            let (mode, mut fan, power) = if occupied {
                (Mode::Cooling, 40.0, 7.0)
            } else {
                (Mode::Off, 30.0, 3.5)
            };
            let episode = zone == EPISODE_ZONE && in_slow_ramp(ts);
            if episode {
                let k = (ts - slow_ramp_start()).num_minutes() / 5;
                fan = 40.0 + 30.0 * k as f64 / (SLOW_RAMP_SAMPLES - 1) as f64;
            }

            out.push(SensorReading {
                timestamp: ts,
                zone_id: zone.to_string(),
                ahu_id: ahu.to_string(),
                temp_zone_c: temp,
                rh_zone_pct: 45.0,
                supply_air_temp_c: 14.0,
                return_air_temp_c: temp + 1.0,
                power_kw: power,
                fan_speed_pct: fan + 1.5 * (2.399 * i as f64).sin(),
                setpoint_c: 22.0,
                mode,
                fault_type: Some(if episode { "clogged_filter" } else { "none" }.to_string()),
            });
        }
    }
    out
}

//! Input validation and gap resolution ahead of feature computation.
//!
//! Rows must carry `timestamp`, `zone_id` and `temp_zone_c`; anything else
//! may be missing and is carried forward from the zone's previous reading.
//! Rows that still have gaps after forward-fill (leading gaps of a zone)
//! are dropped.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{DetectionError, Result};
use crate::types::{RawReading, SensorReading};

/// Fields without which a row cannot be placed or diagnosed.
pub const REQUIRED_FIELDS: [&str; 3] = ["timestamp", "zone_id", "temp_zone_c"];

/// Cleaned readings plus what cleaning had to do to produce them.
#[derive(Debug, Clone, Default)]
pub struct CleanedBatch {
    /// Validated readings ordered by zone, then timestamp
    pub readings: Vec<SensorReading>,
    /// Individual field values taken from a previous reading
    pub forward_filled: usize,
    /// Rows dropped because a gap could not be filled
    pub dropped: usize,
}

/// Reject the batch if any row lacks a required field.
///
/// The error names the field and the zero-based position of the row.
pub fn validate(raw: Vec<RawReading>) -> Result<Vec<RawReading>> {
    for (idx, r) in raw.iter().enumerate() {
        if r.timestamp.is_none() {
            return Err(DetectionError::missing_field_at(REQUIRED_FIELDS[0], idx));
        }
        if r.zone_id.as_deref().map_or(true, str::is_empty) {
            return Err(DetectionError::missing_field_at(REQUIRED_FIELDS[1], idx));
        }
        if !r.temp_zone_c.is_some_and(f64::is_finite) {
            return Err(DetectionError::missing_field_at(REQUIRED_FIELDS[2], idx));
        }
    }
    Ok(raw)
}

/// Sort, forward-fill within each zone and drop rows that stay incomplete.
pub fn clean(raw: Vec<RawReading>) -> CleanedBatch {
    let mut zones: BTreeMap<String, Vec<RawReading>> = BTreeMap::new();
    let mut dropped = 0;
    for r in raw {
        match (&r.zone_id, r.timestamp) {
            (Some(zone), Some(_)) => zones.entry(zone.clone()).or_default().push(r),
            _ => dropped += 1,
        }
    }

    let mut batch = CleanedBatch {
        dropped,
        ..CleanedBatch::default()
    };

    for (zone, mut rows) in zones {
        rows.sort_by_key(|r| r.timestamp);
        let mut previous = RawReading::default();
        for mut row in rows {
            batch.forward_filled += fill_from(&mut row, &previous);
            previous = row.clone();
            match into_reading(row) {
                Some(reading) => batch.readings.push(reading),
                None => {
                    debug!(zone = %zone, "Dropping reading with unfillable gap");
                    batch.dropped += 1;
                }
            }
        }
    }

    if batch.forward_filled > 0 || batch.dropped > 0 {
        warn!(
            forward_filled = batch.forward_filled,
            dropped = batch.dropped,
            kept = batch.readings.len(),
            "Input contained gaps"
        );
    }
    batch
}

/// `validate` followed by `clean`.
pub fn prepare(raw: Vec<RawReading>) -> Result<CleanedBatch> {
    validate(raw).map(clean)
}

/// Fill each missing field of `row` from `previous`; returns how many were filled.
fn fill_from(row: &mut RawReading, previous: &RawReading) -> usize {
    fn carry<T: Clone>(slot: &mut Option<T>, prev: &Option<T>) -> usize {
        if slot.is_none() && prev.is_some() {
            slot.clone_from(prev);
            1
        } else {
            0
        }
    }

    carry(&mut row.ahu_id, &previous.ahu_id)
        + carry(&mut row.temp_zone_c, &previous.temp_zone_c)
        + carry(&mut row.rh_zone_pct, &previous.rh_zone_pct)
        + carry(&mut row.supply_air_temp_c, &previous.supply_air_temp_c)
        + carry(&mut row.return_air_temp_c, &previous.return_air_temp_c)
        + carry(&mut row.power_kw, &previous.power_kw)
        + carry(&mut row.fan_speed_pct, &previous.fan_speed_pct)
        + carry(&mut row.setpoint_c, &previous.setpoint_c)
        + carry(&mut row.mode, &previous.mode)
}

fn into_reading(r: RawReading) -> Option<SensorReading> {
    Some(SensorReading {
        timestamp: r.timestamp?,
        zone_id: r.zone_id?,
        ahu_id: r.ahu_id?,
        temp_zone_c: r.temp_zone_c?,
        rh_zone_pct: r.rh_zone_pct?,
        supply_air_temp_c: r.supply_air_temp_c?,
        return_air_temp_c: r.return_air_temp_c?,
        power_kw: r.power_kw?,
        fan_speed_pct: r.fan_speed_pct?,
        setpoint_c: r.setpoint_c?,
        mode: r.mode?,
        fault_type: r.fault_type,
    })
}

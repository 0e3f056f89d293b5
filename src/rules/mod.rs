//! Rule Engine - explicit HVAC fault signatures over the feature table
//!
//! ## Architecture
//!
//! - [`Rule`]: closed set of diagnostic rules, dispatched by `match`
//! - [`RuleEngine`]: runs every rule over every zone, or one rule on demand
//!
//! Rules never see each other's output. Each one scans zones independently;
//! zones run on the rayon pool and the findings are merged by a single step
//! into rule order, then zone order, then timestamp order.

pub mod clogged_filter;
pub mod compressor_failure;
pub mod oscillating_control;
pub mod temp_drift;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{self, RulesConfig};
use crate::error::Result;
use crate::types::{AnomalyRecord, FeatureRow, FeatureTable, RuleName};

/// The four diagnostic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    TempDrift,
    CloggedFilter,
    CompressorFailure,
    OscillatingControl,
}

impl Rule {
    /// Emission order.
    pub const ALL: [Self; 4] = [
        Self::TempDrift,
        Self::CloggedFilter,
        Self::CompressorFailure,
        Self::OscillatingControl,
    ];

    pub const fn name(self) -> RuleName {
        match self {
            Self::TempDrift => RuleName::TempDrift,
            Self::CloggedFilter => RuleName::CloggedFilter,
            Self::CompressorFailure => RuleName::CompressorFailure,
            Self::OscillatingControl => RuleName::OscillatingControl,
        }
    }

    /// Feature columns the rule reads.
    pub const fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::TempDrift => temp_drift::REQUIRED_COLUMNS,
            Self::CloggedFilter => clogged_filter::REQUIRED_COLUMNS,
            Self::CompressorFailure => compressor_failure::REQUIRED_COLUMNS,
            Self::OscillatingControl => oscillating_control::REQUIRED_COLUMNS,
        }
    }

    /// Scan one zone's rows, in timestamp order.
    pub fn scan_zone(self, rows: &[FeatureRow], config: &RulesConfig) -> Vec<AnomalyRecord> {
        match self {
            Self::TempDrift => temp_drift::scan(rows, &config.temp_drift),
            Self::CloggedFilter => clogged_filter::scan(rows, &config.clogged_filter),
            Self::CompressorFailure => compressor_failure::scan(rows, &config.compressor_failure),
            Self::OscillatingControl => oscillating_control::scan(rows, &config.oscillating_control),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.name(), f)
    }
}

/// Findings of every rule for one zone, indexed like [`Rule::ALL`].
#[derive(Debug, Clone, Default)]
pub struct ZoneFindings {
    per_rule: [Vec<AnomalyRecord>; 4],
}

impl ZoneFindings {
    pub fn for_rule(&self, rule: Rule) -> &[AnomalyRecord] {
        &self.per_rule[rule_index(rule)]
    }

    pub fn len(&self) -> usize {
        self.per_rule.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn rule_index(rule: Rule) -> usize {
    match rule {
        Rule::TempDrift => 0,
        Rule::CloggedFilter => 1,
        Rule::CompressorFailure => 2,
        Rule::OscillatingControl => 3,
    }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RulesConfig,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(config::get().rules.clone())
    }
}

impl RuleEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Fail with a schema error naming the first column any rule needs that
    /// the table lacks.
    pub fn check_schema(table: &FeatureTable) -> Result<()> {
        Rule::ALL
            .iter()
            .try_for_each(|rule| table.require_columns(rule.required_columns()))
    }

    /// Run all rules over the table.
    pub fn detect(&self, table: &FeatureTable) -> Result<Vec<AnomalyRecord>> {
        Self::check_schema(table)?;
        let findings: Vec<ZoneFindings> = table
            .zones()
            .into_par_iter()
            .map(|(_, rows)| self.detect_zone(rows))
            .collect();
        let records = Self::merge(findings);
        info!(records = records.len(), "Rule detection complete");
        Ok(records)
    }

    /// Run a single rule over the table.
    pub fn detect_rule(&self, rule: Rule, table: &FeatureTable) -> Result<Vec<AnomalyRecord>> {
        table.require_columns(rule.required_columns())?;
        let per_zone: Vec<Vec<AnomalyRecord>> = table
            .zones()
            .into_par_iter()
            .map(|(_, rows)| rule.scan_zone(rows, &self.config))
            .collect();
        Ok(per_zone.into_iter().flatten().collect())
    }

    /// Run every rule over one zone. Columns are assumed checked.
    pub fn detect_zone(&self, rows: &[FeatureRow]) -> ZoneFindings {
        let per_rule = Rule::ALL.map(|rule| rule.scan_zone(rows, &self.config));
        if let Some(first) = rows.first() {
            debug!(
                zone = %first.zone_id(),
                findings = per_rule.iter().map(Vec::len).sum::<usize>(),
                "Zone rules evaluated"
            );
        }
        ZoneFindings { per_rule }
    }

    /// Concatenate zone findings (given in zone order) into rule-major order.
    pub fn merge(findings: Vec<ZoneFindings>) -> Vec<AnomalyRecord> {
        let mut by_rule: [Vec<AnomalyRecord>; 4] = Default::default();
        for zone in findings {
            for (slot, records) in by_rule.iter_mut().zip(zone.per_rule) {
                slot.extend(records);
            }
        }
        by_rule.into_iter().flatten().collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::zone_rows;
    use super::*;
    use crate::types::{columns, Severity};

    /// Z1 drifts, Z2 has a clogged filter on its last row.
    fn table() -> FeatureTable {
        let mut z1 = zone_rows("Z1", 8);
        for r in &mut z1 {
            r.temp_error_c = 4.0;
        }
        let mut z2 = zone_rows("Z2", 8);
        z2[7].reading.fan_speed_pct = 85.0;
        z2[7].fan_rolling_mean_short = 72.0;
        z1.extend(z2);
        FeatureTable::new(z1)
    }

    #[test]
    fn test_detect_orders_by_rule_then_zone_then_time() {
        let records = RuleEngine::new(RulesConfig::default())
            .detect(&table())
            .expect("detect");
        assert_eq!(records.len(), 9);
        assert!(records[..8].iter().all(|r| r.rule_name == RuleName::TempDrift));
        assert!(records[..8].windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(records[8].rule_name, RuleName::CloggedFilter);
        assert_eq!(records[8].zone_id, "Z2");
        assert_eq!(records[8].severity, Severity::High);
    }

    #[test]
    fn test_interleaved_zone_rows_scan_as_one_run() {
        let mut z1 = zone_rows("Z1", 10);
        for r in &mut z1 {
            r.temp_error_c = 4.0;
        }
        let tail = z1.split_off(4);
        let mut rows = z1;
        rows.extend(zone_rows("Z2", 3));
        rows.extend(tail);

        let table = FeatureTable::new(rows);
        assert_eq!(table.zones().len(), 2);
        let records = RuleEngine::new(RulesConfig::default())
            .detect(&table)
            .expect("detect");
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.rule_name == RuleName::TempDrift && r.zone_id == "Z1"));
    }

    #[test]
    fn test_detect_rule_runs_one_rule() {
        let engine = RuleEngine::new(RulesConfig::default());
        let only_filter = engine
            .detect_rule(Rule::CloggedFilter, &table())
            .expect("detect");
        assert_eq!(only_filter.len(), 1);
        assert!(engine
            .detect_rule(Rule::CompressorFailure, &table())
            .expect("detect")
            .is_empty());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let records: Vec<serde_json::Value> = zone_rows("Z1", 3)
            .into_iter()
            .map(|r| {
                let mut v = serde_json::to_value(r).expect("serialize");
                if let serde_json::Value::Object(m) = &mut v {
                    m.remove(columns::TEMP_CHANGE_RATE);
                }
                v
            })
            .collect();
        let table = FeatureTable::from_records(records).expect("identity present");
        let engine = RuleEngine::new(RulesConfig::default());

        let err = engine.detect(&table).expect_err("column missing");
        assert!(err.to_string().contains(columns::TEMP_CHANGE_RATE));

        // rules that do not read the column still run
        assert!(engine.detect_rule(Rule::TempDrift, &table).is_ok());
    }

    #[test]
    fn test_empty_table_yields_empty_records() {
        let records = RuleEngine::new(RulesConfig::default())
            .detect(&FeatureTable::default())
            .expect("empty is not an error");
        assert!(records.is_empty());
    }

    #[test]
    fn test_rule_display_matches_wire_name() {
        for rule in Rule::ALL {
            assert_eq!(rule.to_string(), rule.name().as_str());
        }
    }
}

//! Detection results and the per-run summary.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::scorer::UnsupervisedScorer;
use crate::types::{AnomalyRecord, RuleName, Severity};

/// Findings of one run: rule findings first, scorer findings after.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    pub records: Vec<AnomalyRecord>,
    pub rule_record_count: usize,
    pub scorer_record_count: usize,
    /// Feature rows the detectors saw
    pub rows_processed: usize,
    /// Model fitted on this batch, when the run trained one
    pub trained_model: Option<UnsupervisedScorer>,
}

impl DetectionReport {
    pub fn new(
        rule_records: Vec<AnomalyRecord>,
        scorer_records: Vec<AnomalyRecord>,
        rows_processed: usize,
        trained_model: Option<UnsupervisedScorer>,
    ) -> Self {
        let rule_record_count = rule_records.len();
        let scorer_record_count = scorer_records.len();
        let mut records = rule_records;
        records.extend(scorer_records);
        Self {
            records,
            rule_record_count,
            scorer_record_count,
            rows_processed,
            trained_model,
        }
    }

    pub fn rule_records(&self) -> &[AnomalyRecord] {
        &self.records[..self.rule_record_count]
    }

    pub fn scorer_records(&self) -> &[AnomalyRecord] {
        &self.records[self.rule_record_count..]
    }

    /// Findings grouped per detector. Detectors without findings are absent.
    pub fn by_detector(&self) -> BTreeMap<RuleName, Vec<&AnomalyRecord>> {
        let mut groups: BTreeMap<RuleName, Vec<&AnomalyRecord>> = BTreeMap::new();
        for r in &self.records {
            groups.entry(r.rule_name).or_default().push(r);
        }
        groups
    }

    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary {
            total: self.records.len(),
            rows_processed: self.rows_processed,
            ..RunSummary::default()
        };
        for r in &self.records {
            *s.by_rule.entry(r.rule_name).or_default() += 1;
            *s.by_severity.entry(r.severity).or_default() += 1;
            *s.by_fault_label.entry(r.fault_type_label.clone()).or_default() += 1;
        }
        s
    }
}

/// Finding counts by detector, severity and ground-truth label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub rows_processed: usize,
    pub by_rule: BTreeMap<RuleName, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_fault_label: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Emit the summary through tracing.
    pub fn log(&self) {
        info!(total = self.total, rows = self.rows_processed, "Detection summary");
        for (rule, n) in &self.by_rule {
            info!(rule = %rule, count = n, "By detector");
        }
        for (severity, n) in &self.by_severity {
            info!(severity = %severity, count = n, "By severity");
        }
        for (label, n) in &self.by_fault_label {
            info!(fault_type = %label, count = n, "By fault label");
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total anomalies: {} ({} rows scanned)", self.total, self.rows_processed)?;
        writeln!(f, "By detector:")?;
        for (rule, n) in &self.by_rule {
            writeln!(f, "  {rule:<22} {n}")?;
        }
        writeln!(f, "By severity:")?;
        for (severity, n) in self.by_severity.iter().rev() {
            writeln!(f, "  {severity:<22} {n}")?;
        }
        writeln!(f, "By fault label:")?;
        for (label, n) in &self.by_fault_label {
            writeln!(f, "  {label:<22} {n}")?;
        }
        Ok(())
    }
}

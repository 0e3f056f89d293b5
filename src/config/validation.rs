//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::DetectionConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for DetectionConfig.
///
/// Maintained by hand to match the struct hierarchy in detection_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [features]
        "features",
        "features.short_window",
        "features.long_window",
        "features.round_output",
        "features.round_decimals",
        "features.sample_interval_minutes",
        // [rules]
        "rules",
        // [rules.temp_drift]
        "rules.temp_drift",
        "rules.temp_drift.threshold_c",
        "rules.temp_drift.min_duration_samples",
        "rules.temp_drift.high_error_c",
        "rules.temp_drift.score_scale_c",
        "rules.temp_drift.score_cap",
        // [rules.clogged_filter]
        "rules.clogged_filter",
        "rules.clogged_filter.fan_speed_pct",
        "rules.clogged_filter.fan_rolling_mean_pct",
        "rules.clogged_filter.high_fan_speed_pct",
        "rules.clogged_filter.score",
        // [rules.compressor_failure]
        "rules.compressor_failure",
        "rules.compressor_failure.power_kw_max",
        "rules.compressor_failure.temp_error_min_c",
        "rules.compressor_failure.power_rolling_mean_max",
        "rules.compressor_failure.score",
        // [rules.oscillating_control]
        "rules.oscillating_control",
        "rules.oscillating_control.window_samples",
        "rules.oscillating_control.max_sign_changes",
        "rules.oscillating_control.score",
        // [scorer]
        "scorer",
        "scorer.enabled",
        "scorer.n_estimators",
        "scorer.max_samples",
        "scorer.contamination",
        "scorer.seed",
        "scorer.normal_only",
        "scorer.severity_high",
        "scorer.severity_medium",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Edit distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so the suggestion does
/// not depend on hash order.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails on unknown keys; parse errors are reported later by serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed DetectionConfig.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent a run; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(config: &DetectionConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let r = &config.rules;

    // Fan speed is a percentage of max
    for (name, value) in [
        ("clogged_filter.fan_speed_pct", r.clogged_filter.fan_speed_pct),
        ("clogged_filter.fan_rolling_mean_pct", r.clogged_filter.fan_rolling_mean_pct),
        ("clogged_filter.high_fan_speed_pct", r.clogged_filter.high_fan_speed_pct),
    ] {
        if !(0.0..=100.0).contains(&value) {
            errors.push(format!("{name} = {value:.1} is outside physical range (0-100 %)"));
        }
    }

    // Power draw cannot be negative
    for (name, value) in [
        ("compressor_failure.power_kw_max", r.compressor_failure.power_kw_max),
        (
            "compressor_failure.power_rolling_mean_max",
            r.compressor_failure.power_rolling_mean_max,
        ),
    ] {
        if value < 0.0 {
            errors.push(format!("{name} = {value:.2} cannot be negative"));
        }
    }

    // Setpoint deviation: suspicious outside 0.5-15 °C
    let drift = r.temp_drift.threshold_c;
    if !(0.5..=15.0).contains(&drift) {
        warnings.push(ValidationWarning {
            field: "rules.temp_drift.threshold_c".to_string(),
            message: format!("temp_drift.threshold_c = {drift:.1} is outside typical range (0.5-15 °C)"),
            suggestion: None,
        });
    }

    // n change rates have at most n-1 sign changes between them
    let osc = &r.oscillating_control;
    if osc.window_samples >= 2 && osc.max_sign_changes + 1 >= osc.window_samples {
        warnings.push(ValidationWarning {
            field: "rules.oscillating_control.max_sign_changes".to_string(),
            message: format!(
                "oscillating_control.max_sign_changes = {} can never be exceeded in a {}-sample window",
                osc.max_sign_changes, osc.window_samples
            ),
            suggestion: None,
        });
    }

    if config.scorer.enabled && config.scorer.n_estimators < 10 {
        warnings.push(ValidationWarning {
            field: "scorer.n_estimators".to_string(),
            message: format!(
                "scorer.n_estimators = {} gives unstable anomaly scores (typical: 100)",
                config.scorer.n_estimators
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

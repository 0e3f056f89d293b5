//! Detection Configuration - every rule threshold and scorer parameter as TOML
//!
//! Each struct implements `Default` with the reference diagnostic constants,
//! so a deployment without a config file behaves exactly like the built-in
//! rule set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HVAC_SENTINEL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "detection_config.toml";

// ============================================================================
// Config Provenance
// ============================================================================

/// Tracks which configuration keys were explicitly present in the user's TOML file.
///
/// After deserialization every `#[serde(default)]` field has a value; this
/// keeps the distinction for `check-config` reporting.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    /// Dotted key paths explicitly present in the user's TOML file
    pub explicit_keys: HashSet<String>,
    /// File the config was read from, if any
    pub source: Option<PathBuf>,
}

impl ConfigProvenance {
    /// Check whether a dotted key path was explicitly set by the user.
    ///
    /// Example: `provenance.is_user_set("rules.clogged_filter.fan_speed_pct")`
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a detection deployment.
///
/// Load with `DetectionConfig::load()` which searches:
/// 1. `$HVAC_SENTINEL_CONFIG` env var
/// 2. `./detection_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Feature engineering windows and output precision
    #[serde(default)]
    pub features: FeatureConfig,

    /// Thresholds of the four diagnostic rules
    #[serde(default)]
    pub rules: RulesConfig,

    /// Isolation-forest scorer parameters
    #[serde(default)]
    pub scorer: ScorerConfig,
}

impl DetectionConfig {
    /// Load configuration using the standard search order, discarding provenance.
    pub fn load() -> Self {
        Self::load_with_provenance().0
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _provenance) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    /// Load from a specific TOML file path, also returning provenance
    /// so callers can distinguish user-set values from defaults.
    pub fn load_from_file_with_provenance(
        path: &Path,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (config, mut provenance) =
            Self::parse_with_provenance(&contents).map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        provenance.source = Some(path.to_path_buf());
        Ok((config, provenance))
    }

    /// Parse and validate TOML text. Unknown keys are warned about, not rejected.
    pub fn parse_with_provenance(contents: &str) -> Result<(Self, ConfigProvenance), ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let provenance = ConfigProvenance {
            explicit_keys: super::validation::walk_toml_keys(
                &contents
                    .parse::<toml::Value>()
                    .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new())),
                "",
            )
            .into_iter()
            .collect(),
            source: None,
        };

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok((config, provenance))
    }

    /// Load configuration using standard search order, returning provenance.
    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        // 1. Env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok((config, provenance)) => {
                        info!(path = %p.display(), "Loaded detection config from {CONFIG_ENV_VAR}");
                        return (config, provenance);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        // 2. Working directory
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok((config, provenance)) => {
                    info!("Loaded detection config from ./{LOCAL_CONFIG_FILE}");
                    return (config, provenance);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        // 3. Defaults, nothing user-set
        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        (Self::default(), ConfigProvenance::default())
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Detection config saved");
        Ok(())
    }

    /// Validate all parameters for internal consistency.
    ///
    /// Rules:
    /// - Escalation ("high") thresholds must be >= their trigger thresholds
    /// - Window sizes and sample counts must be > 0, long window >= short window
    /// - Contamination must lie in (0, 0.5]
    /// - Scores must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Features
        let f = &self.features;
        if f.short_window == 0 {
            errors.push("features.short_window must be > 0".to_string());
        }
        if f.long_window < f.short_window {
            errors.push(format!(
                "features.long_window ({}) must be >= short_window ({})",
                f.long_window, f.short_window
            ));
        }
        if f.round_decimals > 12 {
            errors.push(format!(
                "features.round_decimals ({}) must be <= 12",
                f.round_decimals
            ));
        }
        if f.sample_interval_minutes == 0 {
            errors.push("features.sample_interval_minutes must be > 0".to_string());
        }

        // Rules
        let r = &self.rules;
        Self::check_escalation(
            r.temp_drift.threshold_c,
            r.temp_drift.high_error_c,
            "temp_drift.error",
            &mut errors,
        );
        if r.temp_drift.min_duration_samples == 0 {
            errors.push("temp_drift.min_duration_samples must be > 0".to_string());
        }
        if r.temp_drift.score_scale_c <= 0.0 {
            errors.push("temp_drift.score_scale_c must be > 0 (used as divisor)".to_string());
        }
        Self::check_escalation(
            r.clogged_filter.fan_speed_pct,
            r.clogged_filter.high_fan_speed_pct,
            "clogged_filter.fan_speed",
            &mut errors,
        );
        if r.oscillating_control.window_samples < 2 {
            errors.push("oscillating_control.window_samples must be >= 2".to_string());
        }

        for (name, score) in [
            ("temp_drift.score_cap", r.temp_drift.score_cap),
            ("clogged_filter.score", r.clogged_filter.score),
            ("compressor_failure.score", r.compressor_failure.score),
            ("oscillating_control.score", r.oscillating_control.score),
        ] {
            if !(score > 0.0) {
                errors.push(format!("{name} must be > 0 (got {score})"));
            }
        }

        // Scorer
        let s = &self.scorer;
        if !(s.contamination > 0.0 && s.contamination <= 0.5) {
            errors.push(format!(
                "scorer.contamination ({}) must be in (0, 0.5]",
                s.contamination
            ));
        }
        if s.n_estimators == 0 {
            errors.push("scorer.n_estimators must be > 0".to_string());
        }
        if s.max_samples < 2 {
            errors.push("scorer.max_samples must be >= 2".to_string());
        }
        Self::check_escalation(
            s.severity_medium,
            s.severity_high,
            "scorer.severity",
            &mut errors,
        );

        // Physical ranges
        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(trigger: f64, high: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !trigger.is_finite() || !high.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got trigger={trigger}, high={high})"
            ));
            return;
        }
        if high < trigger {
            errors.push(format!(
                "{name}: high ({high:.3}) must be >= trigger ({trigger:.3})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            Self::Serialize(e) => write!(f, "Config serialization error: {e}"),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Feature Engineering
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Short trailing window (samples). 3 samples ≈ 15 minutes.
    #[serde(default = "default_short_window")]
    pub short_window: usize,

    /// Long trailing window (samples). 12 samples ≈ 60 minutes.
    #[serde(default = "default_long_window")]
    pub long_window: usize,

    /// Round every numeric feature after computation.
    #[serde(default = "default_round_output")]
    pub round_output: bool,

    #[serde(default = "default_round_decimals")]
    pub round_decimals: u32,

    /// Expected spacing of readings within a zone. Irregular gaps are logged.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_minutes: u32,
}

fn default_short_window() -> usize { 3 }
fn default_long_window() -> usize { 12 }
fn default_round_output() -> bool { true }
fn default_round_decimals() -> u32 { 4 }
fn default_sample_interval() -> u32 { 5 }

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            round_output: default_round_output(),
            round_decimals: default_round_decimals(),
            sample_interval_minutes: default_sample_interval(),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub temp_drift: TempDriftThresholds,
    #[serde(default)]
    pub clogged_filter: CloggedFilterThresholds,
    #[serde(default)]
    pub compressor_failure: CompressorFailureThresholds,
    #[serde(default)]
    pub oscillating_control: OscillatingControlThresholds,
}

/// Sustained setpoint deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempDriftThresholds {
    /// Rows with temp_error_c above this are part of a drift run (°C).
    #[serde(default = "default_drift_threshold")]
    pub threshold_c: f64,

    /// Minimum run length (samples). 6 samples = 30 minutes.
    #[serde(default = "default_drift_min_duration")]
    pub min_duration_samples: usize,

    /// Rows above this error are high severity (°C).
    #[serde(default = "default_drift_high_error")]
    pub high_error_c: f64,

    /// score = min(score_cap, |temp_error_c| / score_scale_c)
    #[serde(default = "default_drift_score_scale")]
    pub score_scale_c: f64,

    #[serde(default = "default_drift_score_cap")]
    pub score_cap: f64,
}

fn default_drift_threshold() -> f64 { 3.0 }
fn default_drift_min_duration() -> usize { 6 }
fn default_drift_high_error() -> f64 { 5.0 }
fn default_drift_score_scale() -> f64 { 3.0 }
fn default_drift_score_cap() -> f64 { 3.0 }

impl Default for TempDriftThresholds {
    fn default() -> Self {
        Self {
            threshold_c: default_drift_threshold(),
            min_duration_samples: default_drift_min_duration(),
            high_error_c: default_drift_high_error(),
            score_scale_c: default_drift_score_scale(),
            score_cap: default_drift_score_cap(),
        }
    }
}

/// Fan working harder against a restricted filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloggedFilterThresholds {
    /// Instantaneous fan speed trigger (%).
    #[serde(default = "default_filter_fan_speed")]
    pub fan_speed_pct: f64,

    /// Short-window rolling mean trigger (%).
    #[serde(default = "default_filter_fan_rolling")]
    pub fan_rolling_mean_pct: f64,

    /// Fan speed above this is high severity (%).
    #[serde(default = "default_filter_high_fan_speed")]
    pub high_fan_speed_pct: f64,

    #[serde(default = "default_filter_score")]
    pub score: f64,
}

fn default_filter_fan_speed() -> f64 { 70.0 }
fn default_filter_fan_rolling() -> f64 { 65.0 }
fn default_filter_high_fan_speed() -> f64 { 80.0 }
fn default_filter_score() -> f64 { 2.0 }

impl Default for CloggedFilterThresholds {
    fn default() -> Self {
        Self {
            fan_speed_pct: default_filter_fan_speed(),
            fan_rolling_mean_pct: default_filter_fan_rolling(),
            high_fan_speed_pct: default_filter_high_fan_speed(),
            score: default_filter_score(),
        }
    }
}

/// Low power draw while the zone runs warm in cooling mode (SAFETY-CRITICAL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorFailureThresholds {
    /// Power below this is suspect (kW).
    #[serde(default = "default_compressor_power")]
    pub power_kw_max: f64,

    /// Zone must be at least this far above setpoint (°C).
    #[serde(default = "default_compressor_temp_error")]
    pub temp_error_min_c: f64,

    /// Long-window rolling mean of power below this (kW).
    #[serde(default = "default_compressor_power_rolling")]
    pub power_rolling_mean_max: f64,

    #[serde(default = "default_compressor_score")]
    pub score: f64,
}

fn default_compressor_power() -> f64 { 2.5 }
fn default_compressor_temp_error() -> f64 { 1.5 }
fn default_compressor_power_rolling() -> f64 { 3.0 }
fn default_compressor_score() -> f64 { 3.0 }

impl Default for CompressorFailureThresholds {
    fn default() -> Self {
        Self {
            power_kw_max: default_compressor_power(),
            temp_error_min_c: default_compressor_temp_error(),
            power_rolling_mean_max: default_compressor_power_rolling(),
            score: default_compressor_score(),
        }
    }
}

/// Hunting control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatingControlThresholds {
    /// Evaluation window (samples). 12 samples = 1 hour.
    #[serde(default = "default_osc_window")]
    pub window_samples: usize,

    /// The window is flagged when sign changes exceed this.
    #[serde(default = "default_osc_sign_changes")]
    pub max_sign_changes: usize,

    #[serde(default = "default_osc_score")]
    pub score: f64,
}

fn default_osc_window() -> usize { 12 }
fn default_osc_sign_changes() -> usize { 6 }
fn default_osc_score() -> f64 { 2.0 }

impl Default for OscillatingControlThresholds {
    fn default() -> Self {
        Self {
            window_samples: default_osc_window(),
            max_sign_changes: default_osc_sign_changes(),
            score: default_osc_score(),
        }
    }
}

// ============================================================================
// Unsupervised Scorer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Run the isolation forest alongside the rules.
    #[serde(default = "default_scorer_enabled")]
    pub enabled: bool,

    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Subsample size per tree (capped at the training set size).
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Expected anomaly fraction; calibrates the decision threshold.
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Train only on rows labelled "none". Offline evaluation only.
    #[serde(default)]
    pub normal_only: bool,

    /// Magnitude above this is high severity.
    #[serde(default = "default_severity_high")]
    pub severity_high: f64,

    /// Magnitude above this is medium severity.
    #[serde(default = "default_severity_medium")]
    pub severity_medium: f64,
}

fn default_scorer_enabled() -> bool { true }
fn default_n_estimators() -> usize { 100 }
fn default_max_samples() -> usize { 256 }
fn default_contamination() -> f64 { 0.02 }
fn default_seed() -> u64 { 42 }
fn default_severity_high() -> f64 { 0.5 }
fn default_severity_medium() -> f64 { 0.3 }

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scorer_enabled(),
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            seed: default_seed(),
            normal_only: false,
            severity_high: default_severity_high(),
            severity_medium: default_severity_medium(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

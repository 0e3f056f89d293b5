//! Detection Configuration Module
//!
//! Rule thresholds, feature windows and scorer parameters loaded from TOML,
//! so operators can retune diagnostics per building without a rebuild.
//!
//! ## Loading Order
//!
//! 1. `HVAC_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `detection_config.toml` in the current working directory
//! 3. Built-in defaults (the reference rule constants)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(DetectionConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().rules.clogged_filter.fan_speed_pct;
//! ```

mod detection_config;
pub mod validation;

pub use detection_config::*;

use std::sync::OnceLock;

/// Global detection configuration, initialized once at startup.
static DETECTION_CONFIG: OnceLock<DetectionConfig> = OnceLock::new();

/// Built-in defaults served before `init()` (library use, unit tests).
static DEFAULT_CONFIG: OnceLock<DetectionConfig> = OnceLock::new();

/// Initialize the global detection configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: DetectionConfig) {
    if DETECTION_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global detection configuration.
///
/// Falls back to built-in defaults when `init()` has not been called.
pub fn get() -> &'static DetectionConfig {
    DETECTION_CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT_CONFIG.get_or_init(DetectionConfig::default))
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    DETECTION_CONFIG.get().is_some()
}

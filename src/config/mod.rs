//! RenewCast Configuration Module
//!
//! Plant registry, constraint parameters and tuning knobs loaded from TOML,
//! so operators can change plants, assets and thresholds without a rebuild.
//!
//! ## Loading Order
//!
//! 1. `RENEWCAST_CONFIG` environment variable (path to TOML file)
//! 2. `renewcast.toml` in the current working directory
//! 3. Built-in defaults (three reference plants: RJ01, GJ01, TN01)
//!
//! A file that exists but cannot be read, parsed or validated is a fatal
//! startup error; there is no silent fallback for plant constraints.
//!
//! ## Usage
//!
//! The core components take their config sections explicitly. The global
//! handle is for the binary and API layer:
//!
//! ```ignore
//! // In main():
//! config::init(RenewcastConfig::load()?);
//!
//! // In an API handler:
//! let addr = &config::get().server.addr;
//! ```

mod app_config;
pub mod defaults;
mod plants;
pub mod validation;

pub use app_config::*;
pub use plants::*;

use std::sync::OnceLock;

/// Global configuration, initialized once at startup.
static RENEWCAST_CONFIG: OnceLock<RenewcastConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: RenewcastConfig) {
    if RENEWCAST_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global configuration.
///
/// Falls back to built-in defaults when `init()` was never called
/// (unit tests, library embedding).
pub fn get() -> &'static RenewcastConfig {
    RENEWCAST_CONFIG.get_or_init(RenewcastConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    RENEWCAST_CONFIG.get().is_some()
}

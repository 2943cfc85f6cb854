//! RenewCast Configuration - plant registry and tuning knobs as TOML values
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a deployment with no config file runs the three reference plants.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use super::plants::{reference_plants, PlantConfig};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RENEWCAST_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "renewcast.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a RenewCast deployment.
///
/// Load with `RenewcastConfig::load()` which searches:
/// 1. `$RENEWCAST_CONFIG` env var
/// 2. `./renewcast.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewcastConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Output log storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Windowed forecaster tuning
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Dispatch policy selection and tuning
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Anomaly detector thresholds
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Publisher retry/backoff and notification sizing
    #[serde(default)]
    pub publish: PublishConfig,

    /// Synthetic telemetry generator
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Plant registry and constraint table
    #[serde(default = "reference_plants")]
    pub plants: Vec<PlantConfig>,
}

impl Default for RenewcastConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            forecast: ForecastConfig::default(),
            policy: PolicyConfig::default(),
            anomaly: AnomalyConfig::default(),
            publish: PublishConfig::default(),
            simulation: SimulationConfig::default(),
            plants: reference_plants(),
        }
    }
}

impl RenewcastConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RENEWCAST_CONFIG` environment variable
    /// 2. `./renewcast.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Unlike a missing file, a file that is present but broken is an error.
    pub fn load() -> Result<Self, ConfigError> {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if !p.exists() {
                return Err(ConfigError::Io(
                    p,
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{CONFIG_ENV_VAR} points to a non-existent file"),
                    ),
                ));
            }
            let config = Self::load_from_file(&p)?;
            info!(path = %p.display(), plants = config.plants.len(), "Loaded config from {}", CONFIG_ENV_VAR);
            return Ok(config);
        }

        // 2. Check ./renewcast.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(plants = config.plants.len(), "Loaded config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings, never rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate registry and tuning values, collecting every problem.
    ///
    /// Rules:
    /// - Plant and asset ids are unique and non-empty
    /// - Constraint values are finite; ramp and capacities positive
    /// - Must-run floor lies within [0, backup capacity]
    /// - Every plant has at least one backup asset
    /// - Tuning sections pass [`super::validation::validate_ranges`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.plants.is_empty() {
            errors.push("plants: at least one plant must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for plant in &self.plants {
            if plant.id.trim().is_empty() {
                errors.push("plants: plant id must not be empty".to_string());
            } else if !seen.insert(plant.id.as_str()) {
                errors.push(format!("plants.{}: duplicate plant id", plant.id));
            }
            plant.collect_errors(&mut errors);
        }

        let (range_errors, range_warnings) = super::validation::validate_ranges(self);
        errors.extend(range_errors);
        for w in range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
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
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server Config
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `RENEWCAST_ADDR` env var or `--addr` CLI flag.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

// ============================================================================
// Storage Config
// ============================================================================

/// Where output logs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// sled database under `data_dir`
    Sled,
    /// Process memory only (tests, demos)
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    /// Also append every Forecast to the forecasts stream
    pub record_forecasts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            backend: StorageBackend::Sled,
            record_forecasts: true,
        }
    }
}

// ============================================================================
// Forecast Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Rolling window horizon (hours)
    pub horizon_hours: f64,
    /// Readings required before the learned band replaces the naive band
    pub min_window_samples: usize,
    /// Quantile regressor SGD step
    pub learning_rate: f64,
    /// EWMA rate of the residual correction term
    pub residual_correction_rate: f64,
    /// Relative widening of the low-confidence band
    pub low_confidence_widening: f64,
    /// Performance ratio for the naive band
    pub naive_performance_ratio: f64,
    pub quantile_low: f64,
    pub quantile_high: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_hours: defaults::FORECAST_HORIZON_HOURS,
            min_window_samples: defaults::FORECAST_MIN_WINDOW_SAMPLES,
            learning_rate: defaults::QUANTILE_LEARNING_RATE,
            residual_correction_rate: defaults::RESIDUAL_CORRECTION_RATE,
            low_confidence_widening: defaults::LOW_CONFIDENCE_WIDENING,
            naive_performance_ratio: defaults::NAIVE_PERFORMANCE_RATIO,
            quantile_low: defaults::QUANTILE_LOW,
            quantile_high: defaults::QUANTILE_HIGH,
        }
    }
}

// ============================================================================
// Policy Config
// ============================================================================

/// Which dispatch policy variant to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Linear learned policy with rule fallback
    Learned,
    /// Deterministic rule only
    Rule,
}

impl std::str::FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "learned" => Ok(PolicyMode::Learned),
            "rule" | "rule_based" | "rule-based" => Ok(PolicyMode::Rule),
            other => Err(format!("unknown policy mode '{other}' (expected learned|rule)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    /// JSON policy model file; the built-in model is used when absent
    pub model_path: Option<PathBuf>,
    /// Poll `model_path` for changes and swap the model atomically
    pub watch_model: bool,
    /// Weight on p_low in the risk-weighted expectation (0..=1)
    pub risk_aversion: f64,
    /// Deficits below this are treated as zero (MW)
    pub deadband_mw: f64,
    /// Preferred assets must cover this fraction of the request
    pub capacity_match_fraction: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Learned,
            model_path: None,
            watch_model: true,
            risk_aversion: defaults::RISK_AVERSION,
            deadband_mw: defaults::DISPATCH_DEADBAND_MW,
            capacity_match_fraction: defaults::ASSET_CAPACITY_MATCH_FRACTION,
        }
    }
}

// ============================================================================
// Anomaly Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub range_tolerance_fraction: f64,
    pub dropout_prior_fraction: f64,
    pub dropout_floor_fraction: f64,
    pub dropout_min_irradiance_wm2: f64,
    pub flatline_samples: usize,
    pub underperformance_fraction: f64,
    pub underperformance_intervals: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            range_tolerance_fraction: defaults::RANGE_TOLERANCE_FRACTION,
            dropout_prior_fraction: defaults::DROPOUT_PRIOR_FRACTION,
            dropout_floor_fraction: defaults::DROPOUT_FLOOR_FRACTION,
            dropout_min_irradiance_wm2: defaults::DROPOUT_MIN_IRRADIANCE_WM2,
            flatline_samples: defaults::FLATLINE_SAMPLES,
            underperformance_fraction: defaults::UNDERPERFORMANCE_FRACTION,
            underperformance_intervals: defaults::UNDERPERFORMANCE_INTERVALS,
        }
    }
}

// ============================================================================
// Publish Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub notify_capacity: usize,
    pub worker_queue_depth: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            retry_initial_ms: defaults::PUBLISH_RETRY_INITIAL_MS,
            retry_max_ms: defaults::PUBLISH_RETRY_MAX_MS,
            notify_capacity: defaults::NOTIFY_CHANNEL_CAPACITY,
            worker_queue_depth: defaults::WORKER_QUEUE_DEPTH,
        }
    }
}

// ============================================================================
// Simulation Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub tick_interval_secs: u64,
    pub weather_every_ticks: u64,
    pub start_solar_hour: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: defaults::SIMULATION_SEED,
            tick_interval_secs: defaults::TELEMETRY_INTERVAL_SECS,
            weather_every_ticks: defaults::WEATHER_EVERY_TICKS,
            start_solar_hour: defaults::SIMULATION_START_HOUR,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! System-wide default constants.
//!
//! Every tunable in `renewcast.toml` falls back to one of these. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// HTTP listen address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Default number of records returned by the query endpoints.
pub const QUERY_DEFAULT_LIMIT: usize = 50;

/// Hard cap on records returned by a single query.
pub const QUERY_MAX_LIMIT: usize = 1_000;

// ============================================================================
// Storage
// ============================================================================

/// Data directory for the sled output logs and the process lock.
pub const DATA_DIR: &str = "./data";

/// sled database directory name inside the data directory.
pub const OUTPUT_DB_NAME: &str = "output_logs.db";

// ============================================================================
// Windowed Forecaster
// ============================================================================

/// Rolling window horizon (hours).
pub const FORECAST_HORIZON_HOURS: f64 = 6.0;

/// Readings required in the window before the learned band is trusted.
///
/// 6 readings = one minute of 10 s telemetry.
pub const FORECAST_MIN_WINDOW_SAMPLES: usize = 6;

/// SGD step size for the pinball-loss quantile regressors.
pub const QUANTILE_LEARNING_RATE: f64 = 0.05;

/// EWMA rate for the residual correction term.
///
/// 0.3 means a step change is ~97 % absorbed after 10 readings.
pub const RESIDUAL_CORRECTION_RATE: f64 = 0.3;

/// Relative widening of the naive band on the low-confidence path.
pub const LOW_CONFIDENCE_WIDENING: f64 = 0.3;

/// Performance ratio applied to nameplate × irradiance for the naive band.
pub const NAIVE_PERFORMANCE_RATIO: f64 = 0.7;

/// Lower and upper quantile levels.
pub const QUANTILE_LOW: f64 = 0.1;
pub const QUANTILE_HIGH: f64 = 0.9;

/// Forecast error history length used for the "improving" flag.
pub const MAE_HISTORY_LEN: usize = 20;

/// Clear-sky reference irradiance (W/m²).
pub const REFERENCE_IRRADIANCE_WM2: f64 = 1_000.0;

// ============================================================================
// Dispatch Policy
// ============================================================================

/// Weight placed on p_low when computing the risk-weighted expectation.
pub const RISK_AVERSION: f64 = 0.7;

/// Deficits below this are treated as zero (MW).
pub const DISPATCH_DEADBAND_MW: f64 = 2.0;

/// Asset must cover at least this fraction of the request to be preferred.
pub const ASSET_CAPACITY_MATCH_FRACTION: f64 = 0.8;

/// Spinning reserve floor (MW).
pub const SPINNING_RESERVE_MIN_MW: f64 = 5.0;

/// Spinning reserve as a fraction of median forecast.
pub const SPINNING_RESERVE_FRACTION: f64 = 0.1;

/// Version label reported by the rule-based policy.
pub const RULE_POLICY_VERSION: &str = "rule-v1";

/// Interval between policy model file mtime checks (ms).
pub const MODEL_WATCH_INTERVAL_MS: u64 = 2_000;

/// Debounce after a detected model file change (ms).
pub const MODEL_WATCH_DEBOUNCE_MS: u64 = 500;

// ============================================================================
// Plant Registry
// ============================================================================

/// India Standard Time offset used when no plant offset is configured.
pub const UTC_OFFSET_HOURS: f64 = 5.5;

/// Asset lead time when not configured (minutes).
pub const ASSET_LEAD_TIME_MIN: u32 = 10;

// ============================================================================
// Anomaly Detector
// ============================================================================

/// Tolerance outside the forecast band, as a fraction of nameplate.
pub const RANGE_TOLERANCE_FRACTION: f64 = 0.05;

/// Previous output must be at least this fraction of nameplate for a dropout.
pub const DROPOUT_PRIOR_FRACTION: f64 = 0.2;

/// Output at or below this fraction of nameplate counts as dropped.
pub const DROPOUT_FLOOR_FRACTION: f64 = 0.02;

/// Irradiance above which zero output is suspicious (W/m²).
pub const DROPOUT_MIN_IRRADIANCE_WM2: f64 = 200.0;

/// Consecutive identical non-zero readings that count as a flatline.
pub const FLATLINE_SAMPLES: usize = 6;

/// Relative shortfall vs. median forecast that counts as underperformance.
pub const UNDERPERFORMANCE_FRACTION: f64 = 0.15;

/// Consecutive underperforming readings before a report is raised.
pub const UNDERPERFORMANCE_INTERVALS: u32 = 6;

// ============================================================================
// Publisher
// ============================================================================

/// First retry delay after a failed append (ms).
pub const PUBLISH_RETRY_INITIAL_MS: u64 = 100;

/// Cap on the retry delay (ms).
pub const PUBLISH_RETRY_MAX_MS: u64 = 5_000;

/// Live notification channel capacity (records).
pub const NOTIFY_CHANNEL_CAPACITY: usize = 1_024;

/// Per-plant worker queue depth (events).
pub const WORKER_QUEUE_DEPTH: usize = 256;

/// Injected-event queue between the API and the processing loop.
pub const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// How long the supervisor waits for tasks to drain after Ctrl+C (s).
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

// ============================================================================
// Simulation
// ============================================================================

/// Seed for the synthetic telemetry generator.
pub const SIMULATION_SEED: u64 = 42;

/// Simulated seconds between telemetry ticks.
pub const TELEMETRY_INTERVAL_SECS: u64 = 10;

/// A weather observation is emitted every N telemetry ticks (30 s).
pub const WEATHER_EVERY_TICKS: u64 = 3;

/// Solar hour at which the simulation starts.
pub const SIMULATION_START_HOUR: f64 = 6.0;

/// Wall-clock delay between synthetic batches at 1x speed (ms).
pub const SIMULATION_BASE_DELAY_MS: u64 = 1_000;

/// Panel area per MW of nameplate (m²).
pub const PANEL_AREA_M2_PER_MW: f64 = 5_000.0;

/// Module conversion efficiency.
pub const PANEL_EFFICIENCY: f64 = 0.20;

/// Nominal inverter efficiency.
pub const INVERTER_EFFICIENCY: f64 = 0.973;

/// Processing loop progress log interval (events).
pub const PROGRESS_LOG_INTERVAL: u64 = 100;

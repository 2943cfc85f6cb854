//! RenewCast: per-plant streaming decision loop for renewable plants
//!
//! Turns live plant telemetry into probabilistic generation forecasts,
//! backup-dispatch decisions gated by grid constraints, and sensor anomaly
//! reports.
//!
//! ## Architecture
//!
//! - **Normalizer**: Validates and routes raw events, enforces per-plant ordering
//! - **Windowed Forecaster**: Online quantile band (p_low / p_median / p_high)
//! - **Dispatch Policy**: Learned linear model with a deterministic rule fallback
//! - **Compliance Gate**: Ramp-rate, must-run and capacity checks, approve or hold
//! - **Anomaly Detector**: Range, dropout, flatline, underperformance, injected faults
//! - **Decision Emitter**: Ordered publication into append-only output logs

pub mod acquisition;
pub mod anomaly;
pub mod api;
pub mod compliance;
pub mod config;
pub mod emitter;
pub mod forecast;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::RenewcastConfig;

// Re-export commonly used types
pub use types::{
    Allocation, AnomalyKind, AnomalyReport, Decision, DecisionStatus, FaultType, Forecast,
    HoldReason, RawEvent, Reading, Severity,
};

// Re-export the decision loop
pub use pipeline::{PipelineContext, PipelineCoordinator, PipelineStats, PlantPipeline, PlantState};

// Re-export components
pub use acquisition::SyntheticGenerator;
pub use compliance::ConstraintTable;
pub use emitter::{DecisionEmitter, Publisher};
pub use forecast::WindowedForecaster;
pub use policy::{DispatchPolicy, PolicyHandle, PolicyModel};
pub use registry::{PlantRegistry, PlantSpec};
pub use storage::{LogRecord, OutputLogs, StreamKind};

//! Shared data structures for the per-plant decision loop
//!
//! This module defines the records that flow through the loop:
//! - Ingestion: RawEvent (telemetry, weather, fault, clear)
//! - Normalizer: Reading (canonical per-plant observation)
//! - Forecaster: Forecast (p_low / p_median / p_high band)
//! - Dispatch Policy: Allocation (candidate asset + MW)
//! - Compliance Gate: Decision (approved or held, terminal)
//! - Anomaly Detector: AnomalyReport (terminal, independent of dispatch)

mod anomaly;
mod dispatch;
mod event;
mod forecast;
mod reading;

pub use anomaly::*;
pub use dispatch::*;
pub use event::*;
pub use forecast::*;
pub use reading::*;

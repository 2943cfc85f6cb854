//! Per-plant state and the shared status view
//!
//! [`PlantState`] is owned by exactly one plant worker and mutated in place.
//! API handlers never see it directly; workers publish a [`PlantSummary`]
//! into the shared [`AppState`] after each event.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PipelineStats;
use crate::acquisition::{Watermarks, WeatherContext};
use crate::anomaly::HealthTracker;
use crate::compliance::ComplianceState;
use crate::config::ForecastConfig;
use crate::forecast::{ForecastDiagnostics, ForecastModel};
use crate::registry::PlantSpec;
use crate::types::{Allocation, DecisionStatus, Forecast};

// ============================================================================
// Plant State
// ============================================================================

/// Mutable aggregate for one plant.
///
/// `version` increments on every accepted event, so two snapshots with the
/// same version and contents describe the same point in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantState {
    pub spec: Arc<PlantSpec>,
    pub version: u64,
    pub watermarks: Watermarks,
    pub weather: Option<WeatherContext>,
    pub forecast: ForecastModel,
    pub health: HealthTracker,
    pub compliance: ComplianceState,
    pub last_forecast: Option<Forecast>,
    pub last_allocation: Option<Allocation>,
    /// Extra committed demand from an active demand-spike fault (MW)
    pub demand_uplift_mw: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl PlantState {
    pub fn new(spec: Arc<PlantSpec>, forecast_config: &ForecastConfig) -> Self {
        Self {
            spec,
            version: 0,
            watermarks: Watermarks::default(),
            weather: None,
            forecast: ForecastModel::new(forecast_config),
            health: HealthTracker::default(),
            compliance: ComplianceState::default(),
            last_forecast: None,
            last_allocation: None,
            demand_uplift_mw: 0.0,
            last_update: None,
        }
    }

    /// Return to the freshly registered state.
    ///
    /// Watermarks and the weather context describe the input stream rather
    /// than the model, so they survive a reset: a clear never re-admits
    /// stale readings.
    pub fn reset(&mut self, forecast_config: &ForecastConfig) {
        self.forecast = ForecastModel::new(forecast_config);
        self.health = HealthTracker::default();
        self.compliance = ComplianceState::default();
        self.last_forecast = None;
        self.last_allocation = None;
        self.demand_uplift_mw = 0.0;
    }

    /// Mark an accepted event. `last_update` never moves backwards; clears
    /// are not order-checked and may carry an older timestamp.
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.last_update = self.last_update.max(Some(at));
    }
}

// ============================================================================
// Shared status view
// ============================================================================

/// What the API reports for one plant.
#[derive(Debug, Clone, Serialize)]
pub struct PlantSummary {
    pub plant_id: String,
    pub name: String,
    pub region: String,
    pub state_version: u64,
    pub last_update: Option<DateTime<Utc>>,
    /// Latest accepted reading or fault; injected faults must be later.
    pub stream_clock: Option<DateTime<Utc>>,
    pub counters: PipelineStats,
    pub last_forecast: Option<Forecast>,
    pub last_status: Option<DecisionStatus>,
    pub last_approved_mw: f64,
    pub last_approved_asset: Option<String>,
    pub demand_uplift_mw: f64,
    pub forecast: ForecastDiagnostics,
}

impl PlantSummary {
    pub fn from_state(state: &PlantState, counters: &PipelineStats) -> Self {
        Self {
            plant_id: state.spec.id.clone(),
            name: state.spec.name.clone(),
            region: state.spec.region.clone(),
            state_version: state.version,
            last_update: state.last_update,
            stream_clock: state.watermarks.stream_clock(),
            counters: counters.clone(),
            last_forecast: state.last_forecast.clone(),
            last_status: state.compliance.last_status,
            last_approved_mw: state.compliance.last_approved_mw,
            last_approved_asset: state.compliance.last_approved_asset.clone(),
            demand_uplift_mw: state.demand_uplift_mw,
            forecast: state.forecast.diagnostics(),
        }
    }
}

/// Shared application state, wrapped in `Arc<tokio::sync::RwLock<_>>`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub started: Instant,
    pub status: SystemStatus,
    pub source: String,
    pub policy_variant: String,
    /// Events the router accepted for delivery
    pub events_routed: u64,
    /// Events rejected before reaching a worker (unknown plant)
    pub events_unroutable: u64,
    pub plants: BTreeMap<String, PlantSummary>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            status: SystemStatus::Initializing,
            source: String::new(),
            policy_variant: String::new(),
            events_routed: 0,
            events_unroutable: 0,
            plants: BTreeMap::new(),
        }
    }
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Lifecycle of the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    Initializing,
    Running,
    /// Source exhausted or shutdown requested; workers draining
    Draining,
    Stopped,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemStatus::Initializing => write!(f, "Initializing"),
            SystemStatus::Running => write!(f, "Running"),
            SystemStatus::Draining => write!(f, "Draining"),
            SystemStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

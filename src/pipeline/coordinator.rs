//! Per-plant decision chain
//!
//! ```text
//! RawEvent ─► Normalizer ─► Forecaster ─► Dispatch Policy ─► Compliance Gate ─► Emitter
//!                               │
//!                               └─► Anomaly Detector (pre-update band) ─► Emitter
//! ```
//!
//! [`PlantPipeline`] runs the chain for one plant, synchronously and in
//! input order. [`PipelineCoordinator`] drives every plant from a single
//! thread; the runtime uses one [`PlantPipeline`] per worker task instead
//! (see `workers`).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::PlantState;
use crate::acquisition::{normalize, route, ClearScope, NormalizeError, Normalized, Route};
use crate::anomaly::AnomalyDetector;
use crate::compliance::{self, ConstraintTable};
use crate::emitter::DecisionEmitter;
use crate::forecast::WindowedForecaster;
use crate::policy::DispatchPolicy;
use crate::registry::PlantRegistry;
use crate::types::{AnomalyReport, Decision, DecisionStatus, DegradedMode, FaultInjection, FaultType, Forecast, RawEvent, Reading};

// ============================================================================
// Shared context
// ============================================================================

/// Read-only components shared by every plant pipeline.
pub struct PipelineContext {
    pub registry: Arc<PlantRegistry>,
    pub constraints: Arc<ConstraintTable>,
    pub forecaster: WindowedForecaster,
    pub policy: DispatchPolicy,
    pub detector: AnomalyDetector,
    pub emitter: DecisionEmitter,
}

impl PipelineContext {
    pub fn new(
        registry: Arc<PlantRegistry>,
        forecaster: WindowedForecaster,
        policy: DispatchPolicy,
        detector: AnomalyDetector,
        emitter: DecisionEmitter,
    ) -> Self {
        let constraints = Arc::new(ConstraintTable::from_registry(&registry));
        Self {
            registry,
            constraints,
            forecaster,
            policy,
            detector,
            emitter,
        }
    }
}

// ============================================================================
// Outcomes and statistics
// ============================================================================

/// What one accepted event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// A reading went through the full chain
    Processed {
        forecast: Forecast,
        decision: Option<Decision>,
        anomalies: Vec<AnomalyReport>,
    },
    WeatherUpdated,
    /// Fault recorded as an anomaly; faults never produce decisions
    FaultRecorded(AnomalyReport),
    Cleared,
}

impl EventOutcome {
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            EventOutcome::Processed { decision, .. } => decision.as_ref(),
            _ => None,
        }
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        match self {
            EventOutcome::Processed { forecast, .. } => Some(forecast),
            _ => None,
        }
    }

    /// Anomaly reports this event produced, injected faults included.
    pub fn anomalies(&self) -> &[AnomalyReport] {
        match self {
            EventOutcome::Processed { anomalies, .. } => anomalies,
            EventOutcome::FaultRecorded(report) => std::slice::from_ref(report),
            _ => &[],
        }
    }
}

/// Event counters, kept per plant and summed for the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub events: u64,
    pub readings: u64,
    pub weather_updates: u64,
    pub approved: u64,
    pub held: u64,
    pub anomalies: u64,
    pub faults: u64,
    pub clears: u64,
    pub rejected_out_of_order: u64,
    pub rejected_malformed: u64,
    pub rejected_unknown_plant: u64,
}

impl PipelineStats {
    pub fn record(&mut self, result: &Result<EventOutcome, NormalizeError>) {
        self.events += 1;
        match result {
            Ok(outcome) => {
                self.anomalies += outcome.anomalies().len() as u64;
                match outcome {
                    EventOutcome::Processed { decision, .. } => {
                        self.readings += 1;
                        match decision.as_ref().map(|d| d.status) {
                            Some(DecisionStatus::Approved) => self.approved += 1,
                            Some(DecisionStatus::Held) => self.held += 1,
                            None => {}
                        }
                    }
                    EventOutcome::WeatherUpdated => self.weather_updates += 1,
                    EventOutcome::FaultRecorded(_) => self.faults += 1,
                    EventOutcome::Cleared => self.clears += 1,
                }
            }
            Err(NormalizeError::OutOfOrder { .. }) => self.rejected_out_of_order += 1,
            Err(NormalizeError::Malformed { .. }) => self.rejected_malformed += 1,
            Err(NormalizeError::UnknownPlant(_)) => self.rejected_unknown_plant += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_out_of_order + self.rejected_malformed + self.rejected_unknown_plant
    }

    pub fn merge(&mut self, other: &PipelineStats) {
        self.events += other.events;
        self.readings += other.readings;
        self.weather_updates += other.weather_updates;
        self.approved += other.approved;
        self.held += other.held;
        self.anomalies += other.anomalies;
        self.faults += other.faults;
        self.clears += other.clears;
        self.rejected_out_of_order += other.rejected_out_of_order;
        self.rejected_malformed += other.rejected_malformed;
        self.rejected_unknown_plant += other.rejected_unknown_plant;
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} events, {} readings, {} approved, {} held, {} anomalies, {} rejected",
            self.events,
            self.readings,
            self.approved,
            self.held,
            self.anomalies,
            self.rejected()
        )
    }
}

// ============================================================================
// Plant pipeline
// ============================================================================

/// Decision chain for one plant, owning that plant's state.
pub struct PlantPipeline {
    ctx: Arc<PipelineContext>,
    state: PlantState,
    stats: PipelineStats,
}

impl PlantPipeline {
    /// Fails only if the plant is not in the registry.
    pub fn new(ctx: Arc<PipelineContext>, plant_id: &str) -> Result<Self, NormalizeError> {
        let spec = ctx
            .registry
            .get(plant_id)
            .ok_or_else(|| NormalizeError::UnknownPlant(plant_id.to_string()))?
            .clone();
        let state = PlantState::new(spec, ctx.forecaster.config());
        Ok(Self {
            ctx,
            state,
            stats: PipelineStats::default(),
        })
    }

    pub fn plant_id(&self) -> &str {
        &self.state.spec.id
    }

    pub fn state(&self) -> &PlantState {
        &self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run one event through the chain.
    ///
    /// A rejected event leaves the plant state untouched. Records are handed
    /// to the emitter in the order forecast, anomalies, decision.
    pub fn handle(&mut self, event: &RawEvent) -> Result<EventOutcome, NormalizeError> {
        let result = self.apply(event);
        if let Err(e) = &result {
            warn!(plant = %self.state.spec.id, kind = event.kind_name(), error = %e, "[Pipeline] Event rejected");
        }
        self.stats.record(&result);
        result
    }

    fn apply(&mut self, event: &RawEvent) -> Result<EventOutcome, NormalizeError> {
        if let Some(id) = event.plant_id() {
            if id != self.state.spec.id {
                return Err(NormalizeError::Malformed {
                    plant_id: id.to_string(),
                    reason: format!("delivered to the {} pipeline", self.state.spec.id),
                });
            }
        }

        let normalized = normalize(
            event,
            &self.ctx.registry,
            &self.state.watermarks,
            self.state.weather.as_ref(),
        )?;
        self.state.watermarks.advance(&normalized);
        self.state.touch(event.timestamp());

        let outcome = match normalized {
            Normalized::Reading(reading) => self.on_reading(&reading),
            Normalized::Weather(weather) => {
                self.state.weather = Some(weather);
                EventOutcome::WeatherUpdated
            }
            Normalized::Fault(fault) => self.on_fault(&fault),
            Normalized::Clear(scope) => {
                self.state.reset(self.ctx.forecaster.config());
                info!(
                    plant = %self.state.spec.id,
                    all = scope == ClearScope::All,
                    "[Pipeline] Plant state cleared"
                );
                EventOutcome::Cleared
            }
        };
        Ok(outcome)
    }

    fn on_reading(&mut self, reading: &Reading) -> EventOutcome {
        let ctx = Arc::clone(&self.ctx);
        let state = &mut self.state;

        let step = ctx.forecaster.observe(&mut state.forecast, &state.spec, reading);
        let anomalies = ctx
            .detector
            .inspect(&mut state.health, &state.spec, reading, &step.prior, &step.substituted);
        let allocation = ctx.policy.decide(state, &step.forecast);

        let decision = match compliance::evaluate(&state.compliance, &allocation, &ctx.constraints) {
            Ok(mut decision) => {
                decision.forecast_timestamp = step.forecast.timestamp;
                if step.forecast.low_confidence {
                    decision.degraded.push(DegradedMode::LowConfidenceForecast);
                }
                if allocation.fallback {
                    decision.degraded.push(DegradedMode::PolicyFallback);
                }
                if !step.substituted.is_empty() {
                    decision.degraded.push(DegradedMode::FeatureSubstitution);
                }
                decision.anomaly_flagged = !anomalies.is_empty();
                state.compliance.record(&decision);
                Some(decision)
            }
            Err(e) => {
                error!(plant = %state.spec.id, error = %e, "[ComplianceGate] Allocation could not be evaluated");
                None
            }
        };

        if let Some(d) = &decision {
            debug!(
                plant = %d.plant_id,
                status = %d.status,
                asset = %d.final_asset,
                final_mw = d.final_mw,
                requested_mw = d.requested_mw,
                reason = ?d.reason,
                "[Pipeline] Decision"
            );
        }

        state.last_forecast = Some(step.forecast.clone());
        state.last_allocation = Some(allocation);

        self.publish(&step.forecast, &anomalies, decision.as_ref());
        EventOutcome::Processed {
            forecast: step.forecast,
            decision,
            anomalies,
        }
    }

    fn on_fault(&mut self, fault: &FaultInjection) -> EventOutcome {
        let state = &mut self.state;
        let report = self
            .ctx
            .detector
            .injected(&mut state.health, fault, state.last_forecast.as_ref());

        if fault.fault_type == FaultType::DemandSpike {
            state.demand_uplift_mw = state.spec.committed_mw * fault.severity.demand_uplift_fraction();
        }
        info!(
            plant = %fault.plant_id,
            fault = %fault.fault_type,
            severity = %fault.severity,
            demand_uplift_mw = state.demand_uplift_mw,
            "[Pipeline] Fault injected"
        );

        if let Err(e) = self.ctx.emitter.emit_anomaly(report.clone()) {
            warn!(plant = %fault.plant_id, error = %e, "[Pipeline] Anomaly not emitted");
        }
        EventOutcome::FaultRecorded(report)
    }

    fn publish(&self, forecast: &Forecast, anomalies: &[AnomalyReport], decision: Option<&Decision>) {
        let emitter = &self.ctx.emitter;
        let result = emitter
            .emit_forecast(forecast.clone())
            .and_then(|()| anomalies.iter().try_for_each(|a| emitter.emit_anomaly(a.clone())))
            .and_then(|()| decision.map_or(Ok(()), |d| emitter.emit_decision(d.clone())));
        if let Err(e) = result {
            warn!(plant = %self.state.spec.id, error = %e, "[Pipeline] Records not emitted");
        }
    }
}

// ============================================================================
// Sequential coordinator
// ============================================================================

/// Drives every plant pipeline from the calling thread.
///
/// Produces exactly the per-plant outputs the worker runtime produces, in a
/// single deterministic order. Used for replays and tests.
pub struct PipelineCoordinator {
    plants: BTreeMap<String, PlantPipeline>,
    unroutable: PipelineStats,
}

impl PipelineCoordinator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let plants = ctx
            .registry
            .iter()
            .map(|spec| {
                let pipeline = PlantPipeline {
                    ctx: Arc::clone(&ctx),
                    state: PlantState::new(Arc::clone(spec), ctx.forecaster.config()),
                    stats: PipelineStats::default(),
                };
                (spec.id.clone(), pipeline)
            })
            .collect();
        Self {
            plants,
            unroutable: PipelineStats::default(),
        }
    }

    /// Route an event to its plant, or to every plant for a clear-all.
    pub fn process(&mut self, event: &RawEvent) -> Result<Vec<EventOutcome>, NormalizeError> {
        let target = match self.plants.values().next() {
            Some(first) => route(event, &first.ctx.registry),
            None => Err(NormalizeError::UnknownPlant(event.plant_id().unwrap_or_default().to_string())),
        };

        match target {
            Ok(Route::Plant(id)) => match self.plants.get_mut(id) {
                Some(pipeline) => pipeline.handle(event).map(|o| vec![o]),
                None => Err(NormalizeError::UnknownPlant(id.to_string())),
            },
            Ok(Route::Broadcast) => self.plants.values_mut().map(|p| p.handle(event)).collect(),
            Err(e) => {
                warn!(kind = event.kind_name(), error = %e, "[Pipeline] Event rejected");
                self.unroutable.record(&Err(e.clone()));
                Err(e)
            }
        }
    }

    pub fn plant(&self, plant_id: &str) -> Option<&PlantPipeline> {
        self.plants.get(plant_id)
    }

    pub fn plants(&self) -> impl Iterator<Item = &PlantPipeline> {
        self.plants.values()
    }

    /// Totals across plants, including unroutable events.
    pub fn stats(&self) -> PipelineStats {
        let mut total = self.unroutable.clone();
        for p in self.plants.values() {
            total.merge(&p.stats);
        }
        total
    }
}

//! Compliance Gate
//!
//! Pure validation of a candidate [`Allocation`] against the plant's hard
//! operating constraints. Checks run in a fixed order and the first violation
//! wins:
//!
//! 1. **Ramp rate**: `|candidate − last_approved| ≤ max_ramp`. A violation is
//!    held at `last_approved ± max_ramp`.
//! 2. **Must-run floor**: a must-run asset asked for less than the floor is
//!    held at the floor.
//!
//! Everything else is approved with the asset's merit class. `last_approved`
//! starts at 0 MW and only moves on approved decisions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::PlantRegistry;
use crate::types::{Allocation, AssetKind, Decision, DecisionStatus, HoldReason, MeritClass};

/// Slack for floating-point comparisons against limits (MW).
const LIMIT_EPSILON_MW: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no constraint entry for plant '{0}'")]
    UnknownPlant(String),

    #[error("asset '{asset}' is not registered for plant '{plant_id}'")]
    UnknownAsset { plant_id: String, asset: String },
}

// ============================================================================
// Constraint Table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AssetConstraint {
    pub kind: AssetKind,
    pub merit_class: MeritClass,
    pub lead_time_min: u32,
    pub must_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantConstraints {
    pub backup_capacity_mw: f64,
    pub max_ramp_mw: f64,
    pub must_run_floor_mw: f64,
    pub utc_offset_hours: f64,
    pub assets: BTreeMap<String, AssetConstraint>,
}

/// Static per-plant limits, shared read-only by every worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintTable {
    plants: BTreeMap<String, PlantConstraints>,
}

impl ConstraintTable {
    pub fn from_registry(registry: &PlantRegistry) -> Self {
        let plants = registry
            .iter()
            .map(|spec| {
                let assets = spec
                    .assets
                    .iter()
                    .map(|a| {
                        (
                            a.id.clone(),
                            AssetConstraint {
                                kind: a.kind,
                                merit_class: a.merit_class,
                                lead_time_min: a.lead_time_min,
                                must_run: a.must_run,
                            },
                        )
                    })
                    .collect();
                (
                    spec.id.clone(),
                    PlantConstraints {
                        backup_capacity_mw: spec.backup_capacity_mw,
                        max_ramp_mw: spec.max_ramp_mw,
                        must_run_floor_mw: spec.must_run_floor_mw,
                        utc_offset_hours: spec.utc_offset_hours,
                        assets,
                    },
                )
            })
            .collect();
        Self { plants }
    }

    pub fn get(&self, plant_id: &str) -> Option<&PlantConstraints> {
        self.plants.get(plant_id)
    }
}

// ============================================================================
// Compliance State
// ============================================================================

/// Per-plant gate memory. Lives inside `PlantState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceState {
    pub last_approved_mw: f64,
    pub last_approved_asset: Option<String>,
    pub last_status: Option<DecisionStatus>,
}

impl ComplianceState {
    /// Fold an emitted decision into the state.
    pub fn record(&mut self, decision: &Decision) {
        self.last_status = Some(decision.status);
        if decision.status == DecisionStatus::Approved {
            self.last_approved_mw = decision.final_mw;
            self.last_approved_asset = Some(decision.final_asset.clone());
        }
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Validate an allocation and produce the terminal decision.
///
/// The returned decision has no degraded flags or anomaly marker; the
/// pipeline adds those before emission.
pub fn evaluate(
    state: &ComplianceState,
    allocation: &Allocation,
    table: &ConstraintTable,
) -> Result<Decision, GateError> {
    let plant = table
        .get(&allocation.plant_id)
        .ok_or_else(|| GateError::UnknownPlant(allocation.plant_id.clone()))?;
    let asset = plant
        .assets
        .get(&allocation.candidate_asset)
        .ok_or_else(|| GateError::UnknownAsset {
            plant_id: allocation.plant_id.clone(),
            asset: allocation.candidate_asset.clone(),
        })?;

    let capacity = plant.backup_capacity_mw;
    let candidate = if allocation.candidate_mw.is_finite() {
        allocation.candidate_mw.clamp(0.0, capacity)
    } else {
        0.0
    };
    let last = state.last_approved_mw;

    let (status, final_mw, reason) = if (candidate - last).abs() > plant.max_ramp_mw + LIMIT_EPSILON_MW {
        let limited = if candidate > last {
            last + plant.max_ramp_mw
        } else {
            last - plant.max_ramp_mw
        };
        (
            DecisionStatus::Held,
            limited.clamp(0.0, capacity),
            Some(HoldReason::RampRateExceeded),
        )
    } else if asset.must_run && candidate + LIMIT_EPSILON_MW < plant.must_run_floor_mw {
        (
            DecisionStatus::Held,
            plant.must_run_floor_mw.min(capacity),
            Some(HoldReason::MustRunViolation),
        )
    } else {
        (DecisionStatus::Approved, candidate, None)
    };

    let action_note = (final_mw > 0.0).then(|| {
        action_note(
            &allocation.candidate_asset,
            final_mw,
            allocation.timestamp,
            asset.lead_time_min,
            plant.utc_offset_hours,
        )
    });

    Ok(Decision {
        plant_id: allocation.plant_id.clone(),
        timestamp: allocation.timestamp,
        status,
        final_asset: allocation.candidate_asset.clone(),
        final_mw,
        reason,
        merit_class: asset.merit_class,
        requested_mw: allocation.candidate_mw,
        forecast_timestamp: allocation.timestamp,
        allocation_timestamp: allocation.timestamp,
        policy_version: allocation.source_policy_version.clone(),
        degraded: Vec::new(),
        anomaly_flagged: false,
        action_note,
    })
}

/// "Confirm <asset> at <MW> MW by HH:MM" in plant local time.
fn action_note(
    asset: &str,
    mw: f64,
    timestamp: DateTime<Utc>,
    lead_time_min: u32,
    utc_offset_hours: f64,
) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let offset = Duration::minutes((utc_offset_hours * 60.0).round() as i64);
    let due = timestamp + Duration::minutes(i64::from(lead_time_min)) + offset;
    format!("Confirm {asset} at {mw:.1} MW by {}", due.format("%H:%M"))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Backup Assets
// ============================================================================

/// Technology class of a dispatchable backup asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Hydro,
    PumpedHydro,
    Battery,
    Gas,
    Coal,
}

impl AssetKind {
    /// Default merit class for this technology (1 = dispatched first).
    pub fn default_merit_class(self) -> MeritClass {
        match self {
            AssetKind::Hydro => MeritClass(1),
            AssetKind::PumpedHydro | AssetKind::Battery => MeritClass(2),
            AssetKind::Gas => MeritClass(3),
            AssetKind::Coal => MeritClass(4),
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Hydro => write!(f, "hydro"),
            AssetKind::PumpedHydro => write!(f, "pumped_hydro"),
            AssetKind::Battery => write!(f, "battery"),
            AssetKind::Gas => write!(f, "gas"),
            AssetKind::Coal => write!(f, "coal"),
        }
    }
}

/// Regulatory/economic dispatch priority applied to an approved allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeritClass(pub u8);

impl std::fmt::Display for MeritClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}

// ============================================================================
// Allocation (Dispatch Policy output)
// ============================================================================

/// Candidate backup-asset allocation produced by the dispatch policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    /// Asset id from the plant's priority list
    pub candidate_asset: String,
    /// Requested MW, already clamped to [0, backup capacity]
    pub candidate_mw: f64,
    /// Model version that produced the allocation (`rule-v1` for the rule policy)
    pub source_policy_version: String,
    /// Risk-weighted shortfall the allocation is meant to cover (MW)
    pub deficit_mw: f64,
    /// Advisory spinning reserve to hold on top of the allocation (MW)
    pub spinning_reserve_mw: f64,
    /// Learned policy could not act and the rule fallback produced this allocation
    pub fallback: bool,
}

// ============================================================================
// Decision (Compliance Gate output)
// ============================================================================

/// Gate outcome. Held is a valid result, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Held,
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionStatus::Approved => write!(f, "APPROVED"),
            DecisionStatus::Held => write!(f, "HELD"),
        }
    }
}

/// Machine-checkable reason attached to every held decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    RampRateExceeded,
    MustRunViolation,
}

impl HoldReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldReason::RampRateExceeded => "ramp_rate_exceeded",
            HoldReason::MustRunViolation => "must_run_violation",
        }
    }
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local recovery paths that shaped a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedMode {
    /// Forecast came from the widened naive band
    LowConfidenceForecast,
    /// Learned policy unavailable; rule fallback used
    PolicyFallback,
    /// One or more forecast features were substituted
    FeatureSubstitution,
}

/// Terminal dispatch record. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: DecisionStatus,
    pub final_asset: String,
    pub final_mw: f64,
    /// Present iff `status == Held`
    pub reason: Option<HoldReason>,
    pub merit_class: MeritClass,
    /// MW the policy asked for before gating
    pub requested_mw: f64,
    pub forecast_timestamp: DateTime<Utc>,
    pub allocation_timestamp: DateTime<Utc>,
    pub policy_version: String,
    #[serde(default)]
    pub degraded: Vec<DegradedMode>,
    /// The triggering reading also produced at least one anomaly report
    #[serde(default)]
    pub anomaly_flagged: bool,
    /// Operator confirmation hint, e.g. "Confirm Suratgarh_Gas at 20.0 MW by 14:35"
    #[serde(default)]
    pub action_note: Option<String>,
}

impl Decision {
    pub fn is_held(&self) -> bool {
        self.status == DecisionStatus::Held
    }

    /// Held decisions carry exactly one reason; approved carry none.
    pub fn is_well_formed(&self) -> bool {
        match self.status {
            DecisionStatus::Held => self.reason.is_some(),
            DecisionStatus::Approved => self.reason.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merit_class_defaults() {
        assert_eq!(AssetKind::Hydro.default_merit_class(), MeritClass(1));
        assert_eq!(AssetKind::PumpedHydro.default_merit_class(), MeritClass(2));
        assert_eq!(AssetKind::Gas.default_merit_class(), MeritClass(3));
        assert_eq!(AssetKind::Coal.default_merit_class(), MeritClass(4));
    }

    #[test]
    fn test_hold_reason_wire_names() {
        let json = serde_json::to_string(&HoldReason::RampRateExceeded).unwrap();
        assert_eq!(json, "\"ramp_rate_exceeded\"");
        assert_eq!(HoldReason::MustRunViolation.to_string(), "must_run_violation");
    }
}

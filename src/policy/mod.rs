//! Dispatch Policy
//!
//! Maps plant state and the latest forecast to a candidate backup
//! allocation. Two variants are chosen at construction:
//!
//! - **Learned**: versioned linear model behind a [`PolicyHandle`], hot-swappable
//! - **Rule-based**: first available asset, `min(deficit, capacity)`
//!
//! The learned variant falls back to the rule whenever it cannot act
//! (no model, wrong weight width, non-finite output). Fallback allocations
//! carry `fallback = true` and the `rule-v1` version label.
//!
//! Both variants share the deficit definition:
//!
//! ```text
//! expected = ρ · p_low + (1 − ρ) · p_median
//! deficit  = max(0, committed + uplift − expected)   (0 below the dead-band)
//! reserve  = max(5 MW, 0.1 · p_median)
//! ```

pub mod learned;
pub mod model;
pub mod rule;
pub mod watcher;

use crate::config::{defaults, PolicyConfig, PolicyMode};
use crate::pipeline::PlantState;
use crate::registry::PlantSpec;
use crate::types::{Allocation, Forecast};

pub use learned::LearnedPolicy;
pub use model::{PolicyHandle, PolicyModel, PolicyModelError, BUILTIN_MODEL_VERSION, POLICY_FEATURE_DIM};
pub use rule::RulePolicy;
pub use watcher::{run_model_watcher, ModelEvent, WatchTiming};

/// Policy variant, fixed for the lifetime of the pipeline.
#[derive(Debug, Clone)]
pub enum DispatchPolicy {
    Learned(LearnedPolicy),
    RuleBased(RulePolicy),
}

impl DispatchPolicy {
    pub fn from_config(config: &PolicyConfig, handle: PolicyHandle) -> Self {
        match config.mode {
            PolicyMode::Learned => Self::Learned(LearnedPolicy::new(config.clone(), handle)),
            PolicyMode::Rule => Self::RuleBased(RulePolicy::new(config.clone())),
        }
    }

    /// Candidate allocation for the current state and forecast.
    ///
    /// Deterministic for identical inputs and model version.
    pub fn decide(&self, state: &PlantState, forecast: &Forecast) -> Allocation {
        match self {
            Self::Learned(policy) => policy.decide(state, forecast),
            Self::RuleBased(policy) => policy.decide(state, forecast),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Learned(_) => "learned",
            Self::RuleBased(_) => "rule",
        }
    }

    /// Version label of the model the next decision would use.
    pub fn active_version(&self) -> String {
        match self {
            Self::Learned(policy) => policy
                .handle()
                .version()
                .unwrap_or_else(|| defaults::RULE_POLICY_VERSION.to_string()),
            Self::RuleBased(_) => defaults::RULE_POLICY_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Shared quantities
// ============================================================================

/// Risk-weighted shortfall against the committed schedule (MW).
pub fn deficit_mw(config: &PolicyConfig, plant: &PlantSpec, demand_uplift_mw: f64, forecast: &Forecast) -> f64 {
    let rho = config.risk_aversion;
    let expected = rho * forecast.p_low + (1.0 - rho) * forecast.p_median;
    let deficit = (plant.committed_mw + demand_uplift_mw - expected).max(0.0);
    if deficit < config.deadband_mw {
        0.0
    } else {
        deficit
    }
}

/// Advisory spinning reserve (MW).
pub fn spinning_reserve_mw(forecast: &Forecast) -> f64 {
    (defaults::SPINNING_RESERVE_FRACTION * forecast.p_median).max(defaults::SPINNING_RESERVE_MIN_MW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spec() -> PlantSpec {
        crate::registry::PlantRegistry::from_config(&crate::config::reference_plants())
            .unwrap()
            .get("RJ01")
            .unwrap()
            .as_ref()
            .clone()
    }

    fn band(low: f64, median: f64, high: f64) -> Forecast {
        Forecast::sorted("RJ01", Utc::now(), [low, median, high], false, 10)
    }

    #[test]
    fn test_deficit_uses_risk_weighted_expectation() {
        // committed 85, expected = 0.7 * 50 + 0.3 * 60 = 53
        let d = deficit_mw(&PolicyConfig::default(), &spec(), 0.0, &band(50.0, 60.0, 70.0));
        assert!((d - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_deficit_inside_deadband_is_zero() {
        let d = deficit_mw(&PolicyConfig::default(), &spec(), 0.0, &band(84.0, 84.0, 90.0));
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_demand_uplift_adds_to_deficit() {
        let base = deficit_mw(&PolicyConfig::default(), &spec(), 0.0, &band(50.0, 60.0, 70.0));
        let spiked = deficit_mw(&PolicyConfig::default(), &spec(), 17.0, &band(50.0, 60.0, 70.0));
        assert!((spiked - base - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_spinning_reserve_floor() {
        assert_eq!(spinning_reserve_mw(&band(0.0, 10.0, 20.0)), 5.0);
        assert!((spinning_reserve_mw(&band(70.0, 80.0, 90.0)) - 8.0).abs() < 1e-9);
    }
}

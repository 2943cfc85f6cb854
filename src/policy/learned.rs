//! Learned linear dispatch policy with rule fallback.

use tracing::debug;

use crate::config::PolicyConfig;
use crate::pipeline::PlantState;
use crate::registry::{BackupAsset, PlantSpec};
use crate::types::{Allocation, Forecast};

use super::model::{PolicyHandle, PolicyModel, POLICY_FEATURE_DIM};
use super::rule::RulePolicy;
use super::{deficit_mw, spinning_reserve_mw};

#[derive(Debug, Clone)]
pub struct LearnedPolicy {
    config: PolicyConfig,
    handle: PolicyHandle,
    fallback: RulePolicy,
}

impl LearnedPolicy {
    pub fn new(config: PolicyConfig, handle: PolicyHandle) -> Self {
        Self {
            fallback: RulePolicy::new(config.clone()),
            config,
            handle,
        }
    }

    pub fn handle(&self) -> &PolicyHandle {
        &self.handle
    }

    pub fn decide(&self, state: &PlantState, forecast: &Forecast) -> Allocation {
        let plant = &state.spec;
        let Some(model) = self.handle.load() else {
            debug!(plant = %plant.id, "[Policy] No model loaded, using rule fallback");
            return self.fallback.allocate(plant, state.demand_uplift_mw, forecast, true);
        };

        let deficit = deficit_mw(&self.config, plant, state.demand_uplift_mw, forecast);
        let cap = plant.backup_capacity_mw;
        let features: [f64; POLICY_FEATURE_DIM] = [
            deficit / cap,
            forecast.spread() / cap,
            forecast.p_low / cap,
            state.compliance.last_approved_mw / cap,
            1.0,
        ];

        let Some(fraction) = model.capacity_fraction(&features) else {
            debug!(
                plant = %plant.id,
                version = %model.version,
                "[Policy] Model produced an invalid action, using rule fallback"
            );
            return self.fallback.allocate(plant, state.demand_uplift_mw, forecast, true);
        };

        // No shortfall, no dispatch.
        let candidate_mw = if deficit > 0.0 {
            (fraction * cap).clamp(0.0, cap)
        } else {
            0.0
        };

        let (asset_id, candidate_mw) = match self.choose_asset(plant, &model, candidate_mw) {
            Some(asset) => (asset.id.clone(), candidate_mw.min(asset.capacity_mw)),
            None => (
                plant.assets.first().map(|a| a.id.clone()).unwrap_or_default(),
                0.0,
            ),
        };

        Allocation {
            plant_id: plant.id.clone(),
            timestamp: forecast.timestamp,
            candidate_asset: asset_id,
            candidate_mw,
            source_policy_version: model.version.clone(),
            deficit_mw: deficit,
            spinning_reserve_mw: spinning_reserve_mw(forecast),
            fallback: false,
        }
    }

    /// Best-scoring available asset that covers enough of the request,
    /// else the fastest available asset. Ties keep priority order.
    fn choose_asset<'a>(&self, plant: &'a PlantSpec, model: &PolicyModel, request_mw: f64) -> Option<&'a BackupAsset> {
        let available = || plant.assets.iter().filter(|a| a.available);
        let needed = self.config.capacity_match_fraction * request_mw;

        let mut best: Option<&BackupAsset> = None;
        for asset in available().filter(|a| a.capacity_mw >= needed) {
            let better = best.map_or(true, |b| model.preference(asset.kind) > model.preference(b.kind));
            if better {
                best = Some(asset);
            }
        }

        best.or_else(|| {
            let mut fastest: Option<&BackupAsset> = None;
            for asset in available() {
                if fastest.map_or(true, |f| asset.lead_time_min < f.lead_time_min) {
                    fastest = Some(asset);
                }
            }
            fastest
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reference_plants, ForecastConfig};
    use crate::policy::BUILTIN_MODEL_VERSION;
    use crate::registry::PlantRegistry;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn state(plant: &str) -> PlantState {
        let registry = PlantRegistry::from_config(&reference_plants()).unwrap();
        PlantState::new(registry.get(plant).unwrap().clone(), &ForecastConfig::default())
    }

    fn forecast(low: f64, median: f64, high: f64) -> Forecast {
        Forecast::sorted("RJ01", Utc::now(), [low, median, high], false, 10)
    }

    #[test]
    fn test_builtin_model_covers_deficit_and_spread() {
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(Some(PolicyModel::builtin())));
        // deficit = 85 - (0.7 * 40 + 0.3 * 50) = 42, spread 20 -> 42 + 6 = 48
        let alloc = policy.decide(&state("RJ01"), &forecast(40.0, 50.0, 60.0));
        assert!(!alloc.fallback);
        assert_eq!(alloc.source_policy_version, BUILTIN_MODEL_VERSION);
        assert!((alloc.candidate_mw - 48.0).abs() < 1e-9);
        // hydro (50 MW) covers 80 % of 48 and has the higher preference
        assert_eq!(alloc.candidate_asset, "RJ_Hydro_01");
    }

    #[test]
    fn test_large_request_moves_to_capable_asset() {
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(Some(PolicyModel::builtin())));
        let alloc = policy.decide(&state("RJ01"), &forecast(0.0, 0.0, 10.0));
        // deficit 85 + 0.3 * 10 = 88; only the 120 MW gas unit covers 70.4
        assert_eq!(alloc.candidate_asset, "Suratgarh_Gas");
        assert!((alloc.candidate_mw - 88.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_model_falls_back_to_rule() {
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(None));
        let alloc = policy.decide(&state("RJ01"), &forecast(40.0, 50.0, 60.0));
        assert!(alloc.fallback);
        assert_eq!(alloc.source_policy_version, "rule-v1");
        assert!((alloc.candidate_mw - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_model_falls_back_to_rule() {
        let bad = PolicyModel {
            version: "broken".to_string(),
            weights: vec![f64::NAN, 0.0, 0.0, 0.0, 0.0],
            asset_preference: BTreeMap::new(),
        };
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(Some(bad)));
        let alloc = policy.decide(&state("RJ01"), &forecast(40.0, 50.0, 60.0));
        assert!(alloc.fallback);
        assert_eq!(alloc.source_policy_version, "rule-v1");
    }

    #[test]
    fn test_zero_deficit_dispatches_nothing() {
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(Some(PolicyModel::builtin())));
        let alloc = policy.decide(&state("RJ01"), &forecast(90.0, 95.0, 100.0));
        assert_eq!(alloc.deficit_mw, 0.0);
        assert_eq!(alloc.candidate_mw, 0.0);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let policy = LearnedPolicy::new(PolicyConfig::default(), PolicyHandle::new(Some(PolicyModel::builtin())));
        let s = state("GJ01");
        let f = forecast(30.0, 40.0, 55.0);
        assert_eq!(policy.decide(&s, &f), policy.decide(&s, &f));
    }
}

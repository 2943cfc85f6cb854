//! Rule-based dispatch: highest-priority available asset, `min(deficit, capacity)`.

use crate::config::{defaults, PolicyConfig};
use crate::pipeline::PlantState;
use crate::registry::PlantSpec;
use crate::types::{Allocation, Forecast};

use super::{deficit_mw, spinning_reserve_mw};

#[derive(Debug, Clone)]
pub struct RulePolicy {
    config: PolicyConfig,
}

impl RulePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, state: &PlantState, forecast: &Forecast) -> Allocation {
        self.allocate(&state.spec, state.demand_uplift_mw, forecast, false)
    }

    /// Rule allocation, also used as the learned policy's fallback.
    pub(crate) fn allocate(
        &self,
        plant: &PlantSpec,
        demand_uplift_mw: f64,
        forecast: &Forecast,
        fallback: bool,
    ) -> Allocation {
        let deficit = deficit_mw(&self.config, plant, demand_uplift_mw, forecast);

        // With nothing available the first listed asset is named at 0 MW.
        let (asset_id, asset_capacity) = match plant.first_available_asset() {
            Some(asset) => (asset.id.clone(), asset.capacity_mw),
            None => (
                plant.assets.first().map(|a| a.id.clone()).unwrap_or_default(),
                0.0,
            ),
        };

        let candidate_mw = deficit.min(asset_capacity).clamp(0.0, plant.backup_capacity_mw);

        Allocation {
            plant_id: plant.id.clone(),
            timestamp: forecast.timestamp,
            candidate_asset: asset_id,
            candidate_mw,
            source_policy_version: defaults::RULE_POLICY_VERSION.to_string(),
            deficit_mw: deficit,
            spinning_reserve_mw: spinning_reserve_mw(forecast),
            fallback,
        }
    }
}

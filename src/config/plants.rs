//! Plant registry entries as they appear in `renewcast.toml`.
//!
//! ```toml
//! [[plants]]
//! id = "RJ01"
//! name = "Rajasthan Solar Park"
//! nameplate_mw = 100.0
//! backup_capacity_mw = 100.0
//! committed_mw = 85.0
//! max_ramp_mw = 25.0
//! must_run_floor_mw = 20.0
//!
//! [[plants.assets]]
//! id = "RJ_Hydro_01"
//! kind = "hydro"
//! capacity_mw = 50.0
//! lead_time_min = 5
//! must_run = true
//! ```
//!
//! Constraint fields have no serde default: a plant without them fails to
//! parse, which is the intended startup failure.

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::types::AssetKind;

/// One generation site and its constraint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    /// Generation nameplate (MW), scales the forecast
    pub nameplate_mw: f64,
    /// Declared backup capacity (MW); allocations never exceed it
    pub backup_capacity_mw: f64,
    /// Scheduled generation the plant has committed to the grid (MW)
    pub committed_mw: f64,
    /// Maximum change in approved MW between consecutive decisions
    pub max_ramp_mw: f64,
    /// Floor for must-run designated assets (MW)
    pub must_run_floor_mw: f64,
    /// Merit class override for every asset of this plant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merit_class: Option<u8>,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: f64,
    /// Backup assets in priority order (first = highest priority)
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

/// A dispatchable backup resource attached to a plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: String,
    pub kind: AssetKind,
    pub capacity_mw: f64,
    /// Minutes from command to full output
    #[serde(default = "default_lead_time")]
    pub lead_time_min: u32,
    /// Regulatory must-run designation
    #[serde(default)]
    pub must_run: bool,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merit_class: Option<u8>,
}

fn default_utc_offset() -> f64 {
    defaults::UTC_OFFSET_HOURS
}

fn default_lead_time() -> u32 {
    defaults::ASSET_LEAD_TIME_MIN
}

fn default_available() -> bool {
    true
}

impl PlantConfig {
    /// Append every constraint problem for this plant to `errors`.
    pub(crate) fn collect_errors(&self, errors: &mut Vec<String>) {
        let id = &self.id;
        let numeric = [
            ("nameplate_mw", self.nameplate_mw),
            ("backup_capacity_mw", self.backup_capacity_mw),
            ("committed_mw", self.committed_mw),
            ("max_ramp_mw", self.max_ramp_mw),
            ("must_run_floor_mw", self.must_run_floor_mw),
            ("utc_offset_hours", self.utc_offset_hours),
        ];
        for (name, value) in numeric {
            if !value.is_finite() {
                errors.push(format!("plants.{id}.{name}: must be finite (got {value})"));
            }
        }

        if self.nameplate_mw <= 0.0 {
            errors.push(format!("plants.{id}.nameplate_mw: must be > 0"));
        }
        if self.backup_capacity_mw <= 0.0 {
            errors.push(format!("plants.{id}.backup_capacity_mw: must be > 0"));
        }
        if self.committed_mw < 0.0 {
            errors.push(format!("plants.{id}.committed_mw: cannot be negative"));
        }
        if self.max_ramp_mw <= 0.0 {
            errors.push(format!("plants.{id}.max_ramp_mw: must be > 0"));
        }
        if self.must_run_floor_mw < 0.0 || self.must_run_floor_mw > self.backup_capacity_mw {
            errors.push(format!(
                "plants.{id}.must_run_floor_mw: {:.1} must lie within [0, backup_capacity_mw = {:.1}]",
                self.must_run_floor_mw, self.backup_capacity_mw
            ));
        }
        if !(-12.0..=14.0).contains(&self.utc_offset_hours) {
            errors.push(format!(
                "plants.{id}.utc_offset_hours: {} is outside [-12, 14]",
                self.utc_offset_hours
            ));
        }
        if self.merit_class == Some(0) {
            errors.push(format!("plants.{id}.merit_class: classes start at 1"));
        }

        if self.assets.is_empty() {
            errors.push(format!("plants.{id}.assets: at least one backup asset is required"));
        }
        let mut seen = std::collections::HashSet::new();
        for asset in &self.assets {
            if asset.id.trim().is_empty() {
                errors.push(format!("plants.{id}.assets: asset id must not be empty"));
            } else if !seen.insert(asset.id.as_str()) {
                errors.push(format!("plants.{id}.assets.{}: duplicate asset id", asset.id));
            }
            if !asset.capacity_mw.is_finite() || asset.capacity_mw <= 0.0 {
                errors.push(format!(
                    "plants.{id}.assets.{}.capacity_mw: must be finite and > 0",
                    asset.id
                ));
            }
            if asset.merit_class == Some(0) {
                errors.push(format!(
                    "plants.{id}.assets.{}.merit_class: classes start at 1",
                    asset.id
                ));
            }
        }
    }
}

// ============================================================================
// Reference Plants
// ============================================================================

fn asset(id: &str, kind: AssetKind, capacity_mw: f64, lead_time_min: u32, must_run: bool) -> AssetConfig {
    AssetConfig {
        id: id.to_string(),
        kind,
        capacity_mw,
        lead_time_min,
        must_run,
        available: true,
        merit_class: None,
    }
}

/// The three reference solar plants used when no config file is present.
///
/// Assets are listed fastest-ramping first, which is their dispatch priority.
pub fn reference_plants() -> Vec<PlantConfig> {
    vec![
        PlantConfig {
            id: "RJ01".to_string(),
            name: "Rajasthan Solar Park".to_string(),
            region: "Rajasthan".to_string(),
            nameplate_mw: 100.0,
            backup_capacity_mw: 100.0,
            committed_mw: 85.0,
            max_ramp_mw: 25.0,
            must_run_floor_mw: 20.0,
            merit_class: None,
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
            assets: vec![
                asset("RJ_Hydro_01", AssetKind::Hydro, 50.0, 5, true),
                asset("Suratgarh_Gas", AssetKind::Gas, 120.0, 15, false),
            ],
        },
        PlantConfig {
            id: "GJ01".to_string(),
            name: "Gujarat Solar Park".to_string(),
            region: "Gujarat".to_string(),
            nameplate_mw: 80.0,
            backup_capacity_mw: 80.0,
            committed_mw: 70.0,
            max_ramp_mw: 20.0,
            must_run_floor_mw: 15.0,
            merit_class: None,
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
            assets: vec![
                asset("GJ_Pumped_01", AssetKind::PumpedHydro, 40.0, 8, true),
                asset("Dhuvaran_Gas", AssetKind::Gas, 100.0, 20, false),
            ],
        },
        PlantConfig {
            id: "TN01".to_string(),
            name: "Tamil Nadu Solar Park".to_string(),
            region: "Tamil Nadu".to_string(),
            nameplate_mw: 60.0,
            backup_capacity_mw: 60.0,
            committed_mw: 55.0,
            max_ramp_mw: 15.0,
            must_run_floor_mw: 12.0,
            merit_class: None,
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
            assets: vec![
                asset("Mettur_Hydro", AssetKind::Hydro, 70.0, 5, true),
                asset("TN_Gas_01", AssetKind::Gas, 80.0, 18, false),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_plants_are_valid() {
        let mut errors = Vec::new();
        for plant in reference_plants() {
            plant.collect_errors(&mut errors);
        }
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_floor_above_capacity_rejected() {
        let mut plant = reference_plants().remove(0);
        plant.must_run_floor_mw = plant.backup_capacity_mw + 1.0;
        let mut errors = Vec::new();
        plant.collect_errors(&mut errors);
        assert!(errors.iter().any(|e| e.contains("must_run_floor_mw")));
    }

    #[test]
    fn test_plant_without_assets_rejected() {
        let mut plant = reference_plants().remove(1);
        plant.assets.clear();
        let mut errors = Vec::new();
        plant.collect_errors(&mut errors);
        assert!(errors.iter().any(|e| e.contains("at least one backup asset")));
    }

    #[test]
    fn test_non_positive_ramp_rejected() {
        let mut plant = reference_plants().remove(2);
        plant.max_ramp_mw = 0.0;
        let mut errors = Vec::new();
        plant.collect_errors(&mut errors);
        assert!(errors.iter().any(|e| e.contains("max_ramp_mw")));
    }
}

//! Plant Registry
//!
//! Immutable, validated view of the configured plants. Built once at startup
//! from [`PlantConfig`] entries and shared read-only (`Arc`) by every plant
//! worker. The Compliance Gate's constraint table is derived from it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ConfigError, PlantConfig};
use crate::types::{AssetKind, MeritClass};

/// A dispatchable backup resource.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupAsset {
    pub id: String,
    pub kind: AssetKind,
    pub capacity_mw: f64,
    pub lead_time_min: u32,
    pub must_run: bool,
    pub available: bool,
    pub merit_class: MeritClass,
}

/// Registry entry for one plant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantSpec {
    pub id: String,
    pub name: String,
    pub region: String,
    pub nameplate_mw: f64,
    pub backup_capacity_mw: f64,
    pub committed_mw: f64,
    pub max_ramp_mw: f64,
    pub must_run_floor_mw: f64,
    pub utc_offset_hours: f64,
    /// Backup assets in priority order
    pub assets: Vec<BackupAsset>,
}

impl PlantSpec {
    pub fn asset(&self, id: &str) -> Option<&BackupAsset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Highest-priority asset that is currently available.
    pub fn first_available_asset(&self) -> Option<&BackupAsset> {
        self.assets.iter().find(|a| a.available)
    }

    fn from_config(cfg: &PlantConfig) -> Self {
        let plant_override = cfg.merit_class.map(MeritClass);
        let assets = cfg
            .assets
            .iter()
            .map(|a| BackupAsset {
                id: a.id.clone(),
                kind: a.kind,
                capacity_mw: a.capacity_mw,
                lead_time_min: a.lead_time_min,
                must_run: a.must_run,
                available: a.available,
                merit_class: plant_override
                    .or(a.merit_class.map(MeritClass))
                    .unwrap_or_else(|| a.kind.default_merit_class()),
            })
            .collect();

        Self {
            id: cfg.id.clone(),
            name: if cfg.name.is_empty() { cfg.id.clone() } else { cfg.name.clone() },
            region: cfg.region.clone(),
            nameplate_mw: cfg.nameplate_mw,
            backup_capacity_mw: cfg.backup_capacity_mw,
            committed_mw: cfg.committed_mw,
            max_ramp_mw: cfg.max_ramp_mw,
            must_run_floor_mw: cfg.must_run_floor_mw,
            utc_offset_hours: cfg.utc_offset_hours,
            assets,
        }
    }
}

/// Read-only map of plant id → spec.
#[derive(Debug, Clone, Default)]
pub struct PlantRegistry {
    plants: BTreeMap<String, Arc<PlantSpec>>,
}

impl PlantRegistry {
    /// Build the registry, re-validating every entry.
    ///
    /// Fails with every problem found; a plant without a complete
    /// constraint entry must stop startup.
    pub fn from_config(plants: &[PlantConfig]) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        let mut map = BTreeMap::new();

        for cfg in plants {
            let before = errors.len();
            cfg.collect_errors(&mut errors);
            if map.contains_key(&cfg.id) {
                errors.push(format!("plants.{}: duplicate plant id", cfg.id));
            }
            if errors.len() == before {
                map.insert(cfg.id.clone(), Arc::new(PlantSpec::from_config(cfg)));
            }
        }

        if map.is_empty() && errors.is_empty() {
            errors.push("plants: at least one plant must be configured".to_string());
        }

        if errors.is_empty() {
            Ok(Self { plants: map })
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn get(&self, plant_id: &str) -> Option<&Arc<PlantSpec>> {
        self.plants.get(plant_id)
    }

    pub fn contains(&self, plant_id: &str) -> bool {
        self.plants.contains_key(plant_id)
    }

    /// Plant ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plants.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PlantSpec>> {
        self.plants.values()
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reference_plants;

    #[test]
    fn test_registry_from_reference_plants() {
        let registry = PlantRegistry::from_config(&reference_plants()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["GJ01", "RJ01", "TN01"]);

        let rj = registry.get("RJ01").unwrap();
        assert_eq!(rj.max_ramp_mw, 25.0);
        assert_eq!(rj.first_available_asset().unwrap().id, "RJ_Hydro_01");
        assert_eq!(rj.asset("Suratgarh_Gas").unwrap().merit_class, MeritClass(3));
    }

    #[test]
    fn test_plant_merit_override_applies_to_all_assets() {
        let mut plants = reference_plants();
        plants[0].merit_class = Some(2);
        let registry = PlantRegistry::from_config(&plants).unwrap();
        let rj = registry.get("RJ01").unwrap();
        assert!(rj.assets.iter().all(|a| a.merit_class == MeritClass(2)));
    }

    #[test]
    fn test_invalid_plant_is_fatal() {
        let mut plants = reference_plants();
        plants[1].max_ramp_mw = -1.0;
        let err = PlantRegistry::from_config(&plants).unwrap_err();
        assert!(err.to_string().contains("GJ01"));
    }

    #[test]
    fn test_unavailable_asset_skipped() {
        let mut plants = reference_plants();
        plants[0].assets[0].available = false;
        let registry = PlantRegistry::from_config(&plants).unwrap();
        assert_eq!(
            registry.get("RJ01").unwrap().first_available_asset().unwrap().id,
            "Suratgarh_Gas"
        );
    }
}

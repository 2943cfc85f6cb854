//! Linear policy model and its hot-swappable handle.
//!
//! Model files are JSON:
//!
//! ```json
//! {
//!   "version": "lin-2026-03-01",
//!   "weights": [1.0, 0.3, 0.0, 0.0, 0.0],
//!   "asset_preference": { "hydro": 0.2, "gas": -0.1 }
//! }
//! ```
//!
//! Weights apply to the normalized feature vector
//! `[deficit, spread, p_low, last_approved, bias]` (MW features divided by
//! backup capacity) and yield a capacity fraction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AssetKind;

/// Width of the policy feature vector.
pub const POLICY_FEATURE_DIM: usize = 5;

/// Version label of the built-in linear model.
pub const BUILTIN_MODEL_VERSION: &str = "lin-builtin-v1";

#[derive(Debug, Error)]
pub enum PolicyModelError {
    #[error("failed to read policy model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy model {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid policy model: {0}")]
    Invalid(String),
}

/// Versioned linear policy weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyModel {
    pub version: String,
    pub weights: Vec<f64>,
    /// Additive score per asset kind when choosing among capable assets
    #[serde(default)]
    pub asset_preference: BTreeMap<AssetKind, f64>,
}

impl PolicyModel {
    /// Cover the deficit plus 30 % of the forecast spread.
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_MODEL_VERSION.to_string(),
            weights: vec![1.0, 0.3, 0.0, 0.0, 0.0],
            asset_preference: BTreeMap::from([
                (AssetKind::Hydro, 0.2),
                (AssetKind::PumpedHydro, 0.15),
                (AssetKind::Battery, 0.1),
                (AssetKind::Gas, 0.0),
                (AssetKind::Coal, -0.1),
            ]),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PolicyModelError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_str(&contents).map_err(|source| PolicyModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), PolicyModelError> {
        if self.version.trim().is_empty() {
            return Err(PolicyModelError::Invalid("version must not be empty".to_string()));
        }
        if self.weights.len() != POLICY_FEATURE_DIM {
            return Err(PolicyModelError::Invalid(format!(
                "expected {POLICY_FEATURE_DIM} weights, got {}",
                self.weights.len()
            )));
        }
        if let Some(w) = self.weights.iter().find(|w| !w.is_finite()) {
            return Err(PolicyModelError::Invalid(format!("non-finite weight {w}")));
        }
        Ok(())
    }

    /// Capacity fraction for a feature vector; `None` when the model cannot act.
    pub fn capacity_fraction(&self, features: &[f64; POLICY_FEATURE_DIM]) -> Option<f64> {
        if self.weights.len() != POLICY_FEATURE_DIM {
            return None;
        }
        let out: f64 = self.weights.iter().zip(features).map(|(w, x)| w * x).sum();
        out.is_finite().then(|| out.clamp(0.0, 1.0))
    }

    pub fn preference(&self, kind: AssetKind) -> f64 {
        self.asset_preference.get(&kind).copied().unwrap_or(0.0)
    }
}

/// Shared slot holding the active model. Each `decide` loads one snapshot.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle(Arc<ArcSwapOption<PolicyModel>>);

impl PolicyHandle {
    pub fn new(model: Option<PolicyModel>) -> Self {
        Self(Arc::new(ArcSwapOption::from(model.map(Arc::new))))
    }

    pub fn load(&self) -> Option<Arc<PolicyModel>> {
        self.0.load_full()
    }

    /// Replace the active model; `None` forces the rule fallback.
    pub fn store(&self, model: Option<PolicyModel>) {
        self.0.store(model.map(Arc::new));
    }

    pub fn version(&self) -> Option<String> {
        self.load().map(|m| m.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_model_is_valid() {
        assert!(PolicyModel::builtin().validate().is_ok());
    }

    #[test]
    fn test_capacity_fraction_clamped() {
        let model = PolicyModel::builtin();
        let f = model.capacity_fraction(&[2.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(f, 1.0);
    }

    #[test]
    fn test_wrong_width_cannot_act() {
        let model = PolicyModel {
            version: "bad".to_string(),
            weights: vec![1.0, 0.3],
            asset_preference: BTreeMap::new(),
        };
        assert!(model.validate().is_err());
        assert_eq!(model.capacity_fraction(&[0.5; POLICY_FEATURE_DIM]), None);
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":"lin-test","weights":[0.9,0.1,0.0,0.0,0.0],"asset_preference":{{"gas":0.5}}}}"#
        )
        .unwrap();
        let model = PolicyModel::load(file.path()).unwrap();
        assert_eq!(model.version, "lin-test");
        assert_eq!(model.preference(AssetKind::Gas), 0.5);
        assert_eq!(model.preference(AssetKind::Hydro), 0.0);
    }

    #[test]
    fn test_handle_swap_is_visible_to_clones() {
        let handle = PolicyHandle::new(None);
        let reader = handle.clone();
        assert!(reader.load().is_none());
        handle.store(Some(PolicyModel::builtin()));
        assert_eq!(reader.version().as_deref(), Some(BUILTIN_MODEL_VERSION));
    }
}

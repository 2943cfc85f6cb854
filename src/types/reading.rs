use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Canonical Reading
// ============================================================================

/// Canonical per-plant observation produced by the Event Normalizer.
///
/// Immutable once created. Feature values may still be non-finite here; the
/// forecaster substitutes them and reports the substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Plant identifier from the registry
    pub plant_id: String,

    /// Observation time (strictly increasing per plant)
    pub timestamp: DateTime<Utc>,

    /// Global horizontal irradiance (W/m²)
    pub irradiance_wm2: f64,

    /// Cloud cover fraction (0.0 - 1.0)
    pub cloud_fraction: f64,

    /// Ambient air temperature (°C)
    pub ambient_temp_c: f64,

    /// Wind speed at hub/mast height (m/s)
    pub wind_speed_ms: f64,

    /// Metered AC generation (MW)
    pub generation_mw: f64,

    /// Local solar hour (0.0 - 24.0) used for the diurnal features
    pub solar_hour: f64,

    /// Raw sensor flags carried from the source
    #[serde(default)]
    pub flags: SensorFlags,
}

/// Flags attached to a reading by the acquisition layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorFlags {
    /// Inverter efficiency reported below its nominal band
    pub inverter_degraded: bool,

    /// No weather observation was available to fill missing fields
    pub weather_missing: bool,
}

/// Forecast input features that can be substituted when corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    Irradiance,
    CloudFraction,
    AmbientTemp,
    WindSpeed,
    SolarHour,
}

impl std::fmt::Display for FeatureField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureField::Irradiance => write!(f, "irradiance"),
            FeatureField::CloudFraction => write!(f, "cloud_fraction"),
            FeatureField::AmbientTemp => write!(f, "ambient_temp"),
            FeatureField::WindSpeed => write!(f, "wind_speed"),
            FeatureField::SolarHour => write!(f, "solar_hour"),
        }
    }
}

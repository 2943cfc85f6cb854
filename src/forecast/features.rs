//! Feature sanitization for the quantile regressors.
//!
//! Non-finite inputs are replaced by the last valid value seen for that
//! plant (or a neutral default before any valid value) and reported so the
//! decision can be marked degraded.

use std::f64::consts::PI;

use crate::config::defaults;
use crate::types::{FeatureField, Reading};

/// Regressor input width: [bias, hour_sin, hour_cos, cloud, irradiance, temperature].
pub const FEATURE_DIM: usize = 6;

/// Temperature scale for the regressor input (°C).
const TEMP_SCALE_C: f64 = 50.0;

/// Physical clamps applied to finite values.
const IRRADIANCE_MAX_WM2: f64 = 1_500.0;
const TEMP_RANGE_C: (f64, f64) = (-40.0, 70.0);
const WIND_MAX_MS: f64 = 60.0;

/// Last valid value per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSanitizer {
    irradiance: f64,
    cloud: f64,
    temp: f64,
    wind: f64,
    hour: f64,
}

impl Default for FeatureSanitizer {
    fn default() -> Self {
        Self {
            irradiance: 0.0,
            cloud: 0.0,
            temp: 25.0,
            wind: 0.0,
            hour: 12.0,
        }
    }
}

/// Sanitized feature values for one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedFeatures {
    pub irradiance_wm2: f64,
    pub cloud_fraction: f64,
    pub ambient_temp_c: f64,
    pub wind_speed_ms: f64,
    pub solar_hour: f64,
    /// Fields that were non-finite and substituted
    pub substituted: Vec<FeatureField>,
}

impl SanitizedFeatures {
    /// Regressor input vector.
    pub fn vector(&self) -> [f64; FEATURE_DIM] {
        let angle = 2.0 * PI * self.solar_hour / 24.0;
        [
            1.0,
            angle.sin(),
            angle.cos(),
            self.cloud_fraction,
            self.irradiance_wm2 / defaults::REFERENCE_IRRADIANCE_WM2,
            self.ambient_temp_c / TEMP_SCALE_C,
        ]
    }
}

impl FeatureSanitizer {
    pub fn sanitize(&mut self, reading: &Reading) -> SanitizedFeatures {
        let mut substituted = Vec::new();

        let mut pick = |value: f64, last: &mut f64, field: FeatureField, clamp: fn(f64) -> f64| -> f64 {
            if value.is_finite() {
                *last = clamp(value);
            } else {
                substituted.push(field);
            }
            *last
        };

        let irradiance_wm2 = pick(
            reading.irradiance_wm2,
            &mut self.irradiance,
            FeatureField::Irradiance,
            |v| v.clamp(0.0, IRRADIANCE_MAX_WM2),
        );
        let cloud_fraction = pick(
            reading.cloud_fraction,
            &mut self.cloud,
            FeatureField::CloudFraction,
            |v| v.clamp(0.0, 1.0),
        );
        let ambient_temp_c = pick(
            reading.ambient_temp_c,
            &mut self.temp,
            FeatureField::AmbientTemp,
            |v| v.clamp(TEMP_RANGE_C.0, TEMP_RANGE_C.1),
        );
        let wind_speed_ms = pick(
            reading.wind_speed_ms,
            &mut self.wind,
            FeatureField::WindSpeed,
            |v| v.clamp(0.0, WIND_MAX_MS),
        );
        let solar_hour = pick(
            reading.solar_hour,
            &mut self.hour,
            FeatureField::SolarHour,
            |v| v.rem_euclid(24.0),
        );

        SanitizedFeatures {
            irradiance_wm2,
            cloud_fraction,
            ambient_temp_c,
            wind_speed_ms,
            solar_hour,
            substituted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorFlags;
    use chrono::Utc;

    fn reading(irradiance: f64, temp: f64) -> Reading {
        Reading {
            plant_id: "RJ01".to_string(),
            timestamp: Utc::now(),
            irradiance_wm2: irradiance,
            cloud_fraction: 0.2,
            ambient_temp_c: temp,
            wind_speed_ms: 3.0,
            generation_mw: 40.0,
            solar_hour: 12.0,
            flags: SensorFlags::default(),
        }
    }

    #[test]
    fn test_nan_replaced_by_last_valid() {
        let mut s = FeatureSanitizer::default();
        let first = s.sanitize(&reading(820.0, 31.0));
        assert!(first.substituted.is_empty());

        let second = s.sanitize(&reading(f64::NAN, f64::INFINITY));
        assert_eq!(second.irradiance_wm2, 820.0);
        assert_eq!(second.ambient_temp_c, 31.0);
        assert_eq!(
            second.substituted,
            vec![FeatureField::Irradiance, FeatureField::AmbientTemp]
        );
    }

    #[test]
    fn test_neutral_default_before_any_valid_value() {
        let mut s = FeatureSanitizer::default();
        let f = s.sanitize(&reading(f64::NAN, f64::NAN));
        assert_eq!(f.irradiance_wm2, 0.0);
        assert_eq!(f.ambient_temp_c, 25.0);
        assert!(f.vector().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_finite_values_clamped() {
        let mut s = FeatureSanitizer::default();
        let f = s.sanitize(&reading(5_000.0, 31.0));
        assert_eq!(f.irradiance_wm2, IRRADIANCE_MAX_WM2);
        assert!(f.substituted.is_empty());
    }
}

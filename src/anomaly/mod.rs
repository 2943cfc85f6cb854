//! Anomaly Detector
//!
//! Observes each reading alongside the forecaster's pre-update band and
//! raises [`AnomalyReport`]s independently of dispatch. Never blocks a
//! decision; a reading with anomalies only marks its decision as flagged.
//!
//! Checks:
//! - `out_of_range`: output outside `[p_low − tol, p_high + tol]`, skipped
//!   while the band is low-confidence
//! - `dropout`: output collapses from ≥ 20 % to ≤ 2 % of nameplate with
//!   irradiance still above 200 W/m²
//! - `flatline`: several identical non-zero readings in a row
//! - `underperformance`: output below the median by more than 15 % for
//!   several consecutive readings
//! - `corrupt_feature`: forecast features were substituted

use serde::Serialize;

use crate::config::AnomalyConfig;
use crate::registry::PlantSpec;
use crate::types::{
    AnomalyKind, AnomalyReport, ExpectedRange, FaultInjection, FeatureField, Forecast, Reading, Severity,
};

/// Equality tolerance for flatline detection (MW).
const FLATLINE_EPSILON_MW: f64 = 1e-9;

// ============================================================================
// Health Tracker
// ============================================================================

/// Per-plant sensor-health memory. Lives inside `PlantState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthTracker {
    pub last_generation_mw: Option<f64>,
    pub flat_value_mw: Option<f64>,
    pub flat_count: usize,
    pub underperformance_streak: u32,
    /// Anomalies raised since the last reset
    pub anomalies_raised: u64,
}

// ============================================================================
// Detector
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Inspect one reading against the band predicted before the model saw it.
    pub fn inspect(
        &self,
        health: &mut HealthTracker,
        plant: &PlantSpec,
        reading: &Reading,
        prior: &Forecast,
        substituted: &[FeatureField],
    ) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        let observed = reading.generation_mw;
        let nameplate = plant.nameplate_mw;
        let band = ExpectedRange {
            low: prior.p_low,
            high: prior.p_high,
        };
        let report = |kind: AnomalyKind, severity: Severity, range: ExpectedRange, detail: String| AnomalyReport {
            plant_id: plant.id.clone(),
            timestamp: reading.timestamp,
            kind,
            observed_value: observed,
            expected_range: range,
            severity,
            fault_type: None,
            detail,
        };

        // Range check against the pre-update band.
        if !prior.low_confidence {
            let tolerance = self.config.range_tolerance_fraction * nameplate;
            if !band.contains(observed, tolerance) {
                let excess = band.excess(observed);
                let severity = severity_for_excess(excess / nameplate);
                reports.push(report(
                    AnomalyKind::OutOfRange,
                    severity,
                    band,
                    format!(
                        "{observed:.1} MW outside [{:.1}, {:.1}] ± {tolerance:.1} MW",
                        band.low, band.high
                    ),
                ));
            }
        }

        // Dropout: sharp collapse while the sun is still up.
        if let Some(previous) = health.last_generation_mw {
            let was_producing = previous >= self.config.dropout_prior_fraction * nameplate;
            let collapsed = observed <= self.config.dropout_floor_fraction * nameplate;
            let sunny = reading.irradiance_wm2.is_finite()
                && reading.irradiance_wm2 > self.config.dropout_min_irradiance_wm2;
            if was_producing && collapsed && sunny {
                reports.push(report(
                    AnomalyKind::Dropout,
                    Severity::High,
                    ExpectedRange {
                        low: self.config.dropout_prior_fraction * nameplate,
                        high: nameplate,
                    },
                    format!(
                        "output fell from {previous:.1} to {observed:.1} MW at {:.0} W/m²",
                        reading.irradiance_wm2
                    ),
                ));
            }
        }

        // Flatline: identical non-zero values.
        match health.flat_value_mw {
            Some(v) if observed > 0.0 && (observed - v).abs() <= FLATLINE_EPSILON_MW => {
                health.flat_count += 1;
            }
            _ => {
                health.flat_value_mw = (observed > 0.0).then_some(observed);
                health.flat_count = usize::from(observed > 0.0);
            }
        }
        if health.flat_count == self.config.flatline_samples {
            reports.push(report(
                AnomalyKind::Flatline,
                Severity::Medium,
                band,
                format!("{} identical readings at {observed:.3} MW", health.flat_count),
            ));
        }

        // Persistent underperformance against the median.
        if prior.low_confidence || prior.p_median <= 0.0 {
            health.underperformance_streak = 0;
        } else if observed < prior.p_median * (1.0 - self.config.underperformance_fraction) {
            health.underperformance_streak += 1;
            if health.underperformance_streak == self.config.underperformance_intervals {
                reports.push(report(
                    AnomalyKind::Underperformance,
                    Severity::Medium,
                    band,
                    format!(
                        "below median by more than {:.0}% for {} readings",
                        self.config.underperformance_fraction * 100.0,
                        health.underperformance_streak
                    ),
                ));
            }
        } else {
            health.underperformance_streak = 0;
        }

        if !substituted.is_empty() {
            let fields: Vec<String> = substituted.iter().map(ToString::to_string).collect();
            reports.push(report(
                AnomalyKind::CorruptFeature,
                Severity::Low,
                band,
                format!("substituted non-finite features: {}", fields.join(", ")),
            ));
        }

        health.last_generation_mw = Some(observed);
        health.anomalies_raised += reports.len() as u64;
        reports
    }

    /// Report for an out-of-band fault injection, carrying its severity.
    pub fn injected(
        &self,
        health: &mut HealthTracker,
        fault: &FaultInjection,
        last_forecast: Option<&Forecast>,
    ) -> AnomalyReport {
        health.anomalies_raised += 1;
        AnomalyReport {
            plant_id: fault.plant_id.clone(),
            timestamp: fault.timestamp,
            kind: AnomalyKind::InjectedFault,
            observed_value: health.last_generation_mw.unwrap_or(0.0),
            expected_range: last_forecast.map_or(ExpectedRange { low: 0.0, high: 0.0 }, |f| ExpectedRange {
                low: f.p_low,
                high: f.p_high,
            }),
            severity: fault.severity,
            fault_type: Some(fault.fault_type),
            detail: format!("injected {} fault ({})", fault.fault_type, fault.severity),
        }
    }
}

fn severity_for_excess(excess_fraction: f64) -> Severity {
    if excess_fraction > 0.25 {
        Severity::High
    } else if excess_fraction > 0.10 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reference_plants;
    use crate::registry::PlantRegistry;
    use crate::types::{FaultType, SensorFlags};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn plant() -> Arc<PlantSpec> {
        PlantRegistry::from_config(&reference_plants())
            .unwrap()
            .get("RJ01")
            .unwrap()
            .clone()
    }

    fn reading(i: i64, generation: f64, irradiance: f64) -> Reading {
        Reading {
            plant_id: "RJ01".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap() + Duration::seconds(10 * i),
            irradiance_wm2: irradiance,
            cloud_fraction: 0.1,
            ambient_temp_c: 30.0,
            wind_speed_ms: 3.0,
            generation_mw: generation,
            solar_hour: 12.0,
            flags: SensorFlags::default(),
        }
    }

    fn band(low: f64, median: f64, high: f64, low_confidence: bool) -> Forecast {
        Forecast::sorted("RJ01", Utc::now(), [low, median, high], low_confidence, 10)
    }

    fn kinds(reports: &[AnomalyReport]) -> Vec<AnomalyKind> {
        reports.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_out_of_range_severity_by_excess() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        // band [50, 70], tolerance 5 MW; 20 MW is 30 MW below -> 0.30 of nameplate
        let reports = detector.inspect(&mut health, &plant(), &reading(0, 20.0, 800.0), &band(50.0, 60.0, 70.0, false), &[]);
        assert_eq!(kinds(&reports), vec![AnomalyKind::OutOfRange]);
        assert_eq!(reports[0].severity, Severity::High);
        assert_eq!(reports[0].expected_range, ExpectedRange { low: 50.0, high: 70.0 });
    }

    #[test]
    fn test_within_tolerance_is_quiet() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let reports = detector.inspect(&mut health, &plant(), &reading(0, 73.0, 800.0), &band(50.0, 60.0, 70.0, false), &[]);
        assert!(reports.is_empty());
    }

    #[test]
    fn test_low_confidence_band_skips_range_check() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let reports = detector.inspect(&mut health, &plant(), &reading(0, 0.0, 800.0), &band(50.0, 60.0, 70.0, true), &[]);
        assert!(reports.is_empty());
    }

    #[test]
    fn test_dropout_detected() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let wide = band(0.0, 50.0, 100.0, true);
        detector.inspect(&mut health, &plant(), &reading(0, 60.0, 900.0), &wide, &[]);
        let reports = detector.inspect(&mut health, &plant(), &reading(1, 0.5, 900.0), &wide, &[]);
        assert_eq!(kinds(&reports), vec![AnomalyKind::Dropout]);
        assert_eq!(reports[0].severity, Severity::High);
    }

    #[test]
    fn test_sunset_is_not_dropout() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let wide = band(0.0, 50.0, 100.0, true);
        detector.inspect(&mut health, &plant(), &reading(0, 60.0, 900.0), &wide, &[]);
        let reports = detector.inspect(&mut health, &plant(), &reading(1, 0.5, 50.0), &wide, &[]);
        assert!(reports.is_empty());
    }

    #[test]
    fn test_flatline_after_identical_readings() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let wide = band(0.0, 50.0, 100.0, true);
        let mut raised = Vec::new();
        for i in 0..8 {
            raised.extend(detector.inspect(&mut health, &plant(), &reading(i, 42.0, 800.0), &wide, &[]));
        }
        assert_eq!(kinds(&raised), vec![AnomalyKind::Flatline]);
    }

    #[test]
    fn test_underperformance_after_streak() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        // median 60, 48 is 20 % below but inside band tolerance
        let b = band(45.0, 60.0, 75.0, false);
        let mut raised = Vec::new();
        for i in 0..6 {
            raised.extend(detector.inspect(&mut health, &plant(), &reading(i, 48.0 + 0.1 * i as f64, 800.0), &b, &[]));
        }
        assert_eq!(kinds(&raised), vec![AnomalyKind::Underperformance]);
    }

    #[test]
    fn test_corrupt_feature_reported() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let reports = detector.inspect(
            &mut health,
            &plant(),
            &reading(0, 10.0, f64::NAN),
            &band(0.0, 10.0, 20.0, true),
            &[FeatureField::Irradiance],
        );
        assert_eq!(kinds(&reports), vec![AnomalyKind::CorruptFeature]);
        assert_eq!(reports[0].severity, Severity::Low);
        assert!(reports[0].detail.contains("irradiance"));
    }

    #[test]
    fn test_injected_fault_carries_severity() {
        let detector = AnomalyDetector::new(AnomalyConfig::default());
        let mut health = HealthTracker::default();
        let fault = FaultInjection {
            plant_id: "GJ01".to_string(),
            timestamp: Utc::now(),
            fault_type: FaultType::InverterFault,
            severity: Severity::High,
        };
        let report = detector.injected(&mut health, &fault, None);
        assert_eq!(report.kind, AnomalyKind::InjectedFault);
        assert_eq!(report.severity, Severity::High);
        assert_eq!(report.fault_type, Some(FaultType::InverterFault));
        assert_eq!(health.anomalies_raised, 1);
    }
}

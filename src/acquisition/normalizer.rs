//! Event Normalizer
//!
//! Maps a [`RawEvent`] to its canonical form. Pure: the caller owns the
//! per-plant [`Watermarks`] and advances them only after the normalized
//! event has been accepted.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{PlantRegistry, PlantSpec};
use crate::types::{FaultInjection, RawEvent, Reading, SensorFlags, TelemetryTick, WeatherObservation};

/// Inverter efficiency below this marks the reading as degraded.
const INVERTER_DEGRADED_BELOW: f64 = 0.95;

/// Input rejection. Logged and counted by the caller, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("unknown plant '{0}'")]
    UnknownPlant(String),

    #[error("out-of-order {kind} for {plant_id}: {timestamp} <= last accepted {last_accepted}")]
    OutOfOrder {
        plant_id: String,
        kind: &'static str,
        timestamp: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },

    #[error("malformed event for {plant_id}: {reason}")]
    Malformed { plant_id: String, reason: String },
}

/// Latest weather observation for a plant, used to fill sparse telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherContext {
    pub timestamp: DateTime<Utc>,
    pub cloud_fraction: f64,
    pub temp_c: f64,
    pub wind_speed_ms: f64,
    pub ghi_wm2: Option<f64>,
}

/// Which plants a clear command resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Plant(String),
    All,
}

/// Normalizer output. Only `Reading` drives the decision chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Reading(Reading),
    Weather(WeatherContext),
    Fault(FaultInjection),
    Clear(ClearScope),
}

/// Last accepted timestamp per event class for one plant.
///
/// Readings and faults both feed the anomaly stream, so they share one
/// clock: each must be strictly later than the latest of either. Weather
/// observations are ordered on their own. Clears carry no watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks {
    pub last_reading: Option<DateTime<Utc>>,
    pub last_fault: Option<DateTime<Utc>>,
    pub last_weather: Option<DateTime<Utc>>,
}

impl Watermarks {
    /// Record an accepted event.
    pub fn advance(&mut self, normalized: &Normalized) {
        match normalized {
            Normalized::Reading(r) => self.last_reading = Some(r.timestamp),
            Normalized::Weather(w) => self.last_weather = Some(w.timestamp),
            Normalized::Fault(f) => self.last_fault = Some(f.timestamp),
            Normalized::Clear(_) => {}
        }
    }

    /// Latest accepted reading or fault.
    pub fn stream_clock(&self) -> Option<DateTime<Utc>> {
        self.last_reading.max(self.last_fault)
    }
}

/// Where the router should deliver an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Plant(&'a str),
    Broadcast,
}

/// Resolve the destination of an event without normalizing it.
pub fn route<'a>(event: &'a RawEvent, registry: &PlantRegistry) -> Result<Route<'a>, NormalizeError> {
    match event.plant_id() {
        None => Ok(Route::Broadcast),
        Some(id) if registry.contains(id) => Ok(Route::Plant(id)),
        Some(id) => Err(NormalizeError::UnknownPlant(id.to_string())),
    }
}

/// Normalize one raw event for its plant.
pub fn normalize(
    event: &RawEvent,
    registry: &PlantRegistry,
    watermarks: &Watermarks,
    weather: Option<&WeatherContext>,
) -> Result<Normalized, NormalizeError> {
    let spec = match event.plant_id() {
        None => return Ok(Normalized::Clear(ClearScope::All)),
        Some(id) => registry
            .get(id)
            .ok_or_else(|| NormalizeError::UnknownPlant(id.to_string()))?,
    };

    match event {
        RawEvent::Telemetry(tick) => {
            check_order(&spec.id, "reading", tick.timestamp, watermarks.stream_clock())?;
            reading_from_tick(tick, spec, weather).map(Normalized::Reading)
        }
        RawEvent::Weather(obs) => {
            check_order(&spec.id, "weather", obs.timestamp, watermarks.last_weather)?;
            weather_from_observation(obs, &spec.id).map(Normalized::Weather)
        }
        RawEvent::Fault(fault) => {
            check_order(&spec.id, "fault", fault.timestamp, watermarks.stream_clock())?;
            Ok(Normalized::Fault(fault.clone()))
        }
        RawEvent::Clear(_) => Ok(Normalized::Clear(ClearScope::Plant(spec.id.clone()))),
    }
}

fn check_order(
    plant_id: &str,
    kind: &'static str,
    timestamp: DateTime<Utc>,
    last: Option<DateTime<Utc>>,
) -> Result<(), NormalizeError> {
    match last {
        Some(last_accepted) if timestamp <= last_accepted => Err(NormalizeError::OutOfOrder {
            plant_id: plant_id.to_string(),
            kind,
            timestamp,
            last_accepted,
        }),
        _ => Ok(()),
    }
}

fn check_cloud_fraction(plant_id: &str, cloud: f64) -> Result<(), NormalizeError> {
    if cloud.is_finite() && !(0.0..=1.0).contains(&cloud) {
        return Err(NormalizeError::Malformed {
            plant_id: plant_id.to_string(),
            reason: format!("cloud fraction {cloud} outside [0, 1]"),
        });
    }
    Ok(())
}

fn reading_from_tick(
    tick: &TelemetryTick,
    spec: &PlantSpec,
    weather: Option<&WeatherContext>,
) -> Result<Reading, NormalizeError> {
    if !tick.ac_power_mw.is_finite() || tick.ac_power_mw < 0.0 {
        return Err(NormalizeError::Malformed {
            plant_id: spec.id.clone(),
            reason: format!("metered output {} MW is not a finite non-negative value", tick.ac_power_mw),
        });
    }

    let mut flags = SensorFlags {
        inverter_degraded: tick
            .inverter_efficiency
            .is_some_and(|eff| eff < INVERTER_DEGRADED_BELOW),
        weather_missing: false,
    };

    // Sparse ticks borrow from the latest weather context; without one the
    // gap stays NaN and the forecaster substitutes it.
    let mut fill = |own: Option<f64>, from_weather: Option<f64>| -> f64 {
        own.or(from_weather).unwrap_or_else(|| {
            flags.weather_missing = true;
            f64::NAN
        })
    };

    let cloud_fraction = fill(tick.cloud_fraction, weather.map(|w| w.cloud_fraction));
    let irradiance_wm2 = fill(tick.ghi_wm2, weather.and_then(|w| w.ghi_wm2));
    let ambient_temp_c = fill(tick.temp_c, weather.map(|w| w.temp_c));
    let wind_speed_ms = fill(tick.wind_speed_ms, weather.map(|w| w.wind_speed_ms));

    check_cloud_fraction(&spec.id, cloud_fraction)?;

    let solar_hour = tick
        .solar_hour
        .unwrap_or_else(|| solar_hour_at(tick.timestamp, spec.utc_offset_hours));

    Ok(Reading {
        plant_id: spec.id.clone(),
        timestamp: tick.timestamp,
        irradiance_wm2,
        cloud_fraction,
        ambient_temp_c,
        wind_speed_ms,
        generation_mw: tick.ac_power_mw,
        solar_hour,
        flags,
    })
}

fn weather_from_observation(obs: &WeatherObservation, plant_id: &str) -> Result<WeatherContext, NormalizeError> {
    check_cloud_fraction(plant_id, obs.cloud_fraction)?;
    Ok(WeatherContext {
        timestamp: obs.timestamp,
        cloud_fraction: obs.cloud_fraction,
        temp_c: obs.temp_c,
        wind_speed_ms: obs.wind_speed_ms,
        ghi_wm2: obs.ghi_wm2,
    })
}

/// Local clock hour in [0, 24) for a UTC instant and a fixed offset.
pub fn solar_hour_at(timestamp: DateTime<Utc>, utc_offset_hours: f64) -> f64 {
    let utc_hour = f64::from(timestamp.hour())
        + f64::from(timestamp.minute()) / 60.0
        + f64::from(timestamp.second()) / 3600.0;
    (utc_hour + utc_offset_hours).rem_euclid(24.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reference_plants;
    use crate::types::{ClearCommand, FaultType, Severity};
    use chrono::TimeZone;

    fn registry() -> PlantRegistry {
        PlantRegistry::from_config(&reference_plants()).unwrap()
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 6, minute, 0).unwrap()
    }

    fn tick(plant: &str, minute: u32, mw: f64) -> RawEvent {
        RawEvent::Telemetry(TelemetryTick {
            plant_id: plant.to_string(),
            timestamp: ts(minute),
            ac_power_mw: mw,
            ghi_wm2: Some(800.0),
            cloud_fraction: Some(0.1),
            temp_c: Some(30.0),
            wind_speed_ms: Some(3.0),
            solar_hour: Some(12.0),
            inverter_efficiency: None,
        })
    }

    #[test]
    fn test_telemetry_becomes_reading() {
        let out = normalize(&tick("RJ01", 0, 40.0), &registry(), &Watermarks::default(), None).unwrap();
        let Normalized::Reading(r) = out else {
            panic!("expected reading");
        };
        assert_eq!(r.generation_mw, 40.0);
        assert_eq!(r.irradiance_wm2, 800.0);
        assert!(!r.flags.weather_missing);
    }

    #[test]
    fn test_unknown_plant_rejected() {
        let err = normalize(&tick("XX99", 0, 1.0), &registry(), &Watermarks::default(), None).unwrap_err();
        assert_eq!(err, NormalizeError::UnknownPlant("XX99".to_string()));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let marks = Watermarks {
            last_reading: Some(ts(5)),
            ..Watermarks::default()
        };
        let err = normalize(&tick("RJ01", 5, 1.0), &registry(), &marks, None).unwrap_err();
        assert!(matches!(err, NormalizeError::OutOfOrder { kind: "reading", .. }));
    }

    #[test]
    fn test_weather_watermark_is_independent() {
        let marks = Watermarks {
            last_reading: Some(ts(30)),
            ..Watermarks::default()
        };
        let obs = RawEvent::Weather(WeatherObservation {
            plant_id: "RJ01".to_string(),
            timestamp: ts(10),
            cloud_fraction: 0.4,
            temp_c: 28.0,
            wind_speed_ms: 2.0,
            ghi_wm2: None,
        });
        assert!(matches!(
            normalize(&obs, &registry(), &marks, None),
            Ok(Normalized::Weather(_))
        ));
    }

    #[test]
    fn test_negative_output_is_malformed() {
        let err = normalize(&tick("RJ01", 0, -3.0), &registry(), &Watermarks::default(), None).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { .. }));
    }

    #[test]
    fn test_cloud_fraction_out_of_bounds_is_malformed() {
        let mut event = tick("RJ01", 0, 10.0);
        if let RawEvent::Telemetry(t) = &mut event {
            t.cloud_fraction = Some(1.4);
        }
        let err = normalize(&event, &registry(), &Watermarks::default(), None).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { .. }));
    }

    #[test]
    fn test_nan_feature_passes_through() {
        let mut event = tick("RJ01", 0, 10.0);
        if let RawEvent::Telemetry(t) = &mut event {
            t.ghi_wm2 = Some(f64::NAN);
        }
        let Ok(Normalized::Reading(r)) = normalize(&event, &registry(), &Watermarks::default(), None) else {
            panic!("expected reading");
        };
        assert!(r.irradiance_wm2.is_nan());
    }

    #[test]
    fn test_missing_fields_filled_from_weather() {
        let event = RawEvent::Telemetry(TelemetryTick {
            plant_id: "GJ01".to_string(),
            timestamp: ts(1),
            ac_power_mw: 20.0,
            ghi_wm2: None,
            cloud_fraction: None,
            temp_c: None,
            wind_speed_ms: None,
            solar_hour: None,
            inverter_efficiency: Some(0.90),
        });
        let weather = WeatherContext {
            timestamp: ts(0),
            cloud_fraction: 0.6,
            temp_c: 33.0,
            wind_speed_ms: 4.0,
            ghi_wm2: Some(500.0),
        };
        let Ok(Normalized::Reading(r)) = normalize(&event, &registry(), &Watermarks::default(), Some(&weather)) else {
            panic!("expected reading");
        };
        assert_eq!(r.cloud_fraction, 0.6);
        assert_eq!(r.irradiance_wm2, 500.0);
        assert!(r.flags.inverter_degraded);
        assert!(!r.flags.weather_missing);
        // 06:01 UTC + 5.5 h
        assert!((r.solar_hour - (11.5 + 1.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_without_weather_flagged() {
        let event = RawEvent::Telemetry(TelemetryTick {
            plant_id: "TN01".to_string(),
            timestamp: ts(1),
            ac_power_mw: 20.0,
            ghi_wm2: None,
            cloud_fraction: None,
            temp_c: None,
            wind_speed_ms: None,
            solar_hour: None,
            inverter_efficiency: None,
        });
        let Ok(Normalized::Reading(r)) = normalize(&event, &registry(), &Watermarks::default(), None) else {
            panic!("expected reading");
        };
        assert!(r.flags.weather_missing);
        assert!(r.irradiance_wm2.is_nan());
    }

    fn fault(minute: u32) -> RawEvent {
        RawEvent::Fault(FaultInjection {
            plant_id: "GJ01".to_string(),
            timestamp: ts(minute),
            fault_type: FaultType::Cloud,
            severity: Severity::High,
        })
    }

    #[test]
    fn test_stale_fault_rejected_against_reading_clock() {
        let marks = Watermarks {
            last_reading: Some(ts(30)),
            ..Watermarks::default()
        };
        let err = normalize(&fault(0), &registry(), &marks, None).unwrap_err();
        assert!(matches!(err, NormalizeError::OutOfOrder { kind: "fault", .. }));
        assert!(matches!(normalize(&fault(31), &registry(), &marks, None), Ok(Normalized::Fault(_))));
    }

    #[test]
    fn test_reading_rejected_at_or_before_last_fault() {
        let mut marks = Watermarks::default();
        let accepted = normalize(&fault(10), &registry(), &marks, None).unwrap();
        marks.advance(&accepted);
        assert_eq!(marks.stream_clock(), Some(ts(10)));

        let err = normalize(&tick("GJ01", 10, 5.0), &registry(), &marks, None).unwrap_err();
        assert!(matches!(err, NormalizeError::OutOfOrder { kind: "reading", .. }));
        assert!(normalize(&tick("GJ01", 11, 5.0), &registry(), &marks, None).is_ok());
    }

    #[test]
    fn test_clear_skips_order_check() {
        let marks = Watermarks {
            last_reading: Some(ts(30)),
            last_fault: Some(ts(31)),
            last_weather: Some(ts(30)),
        };
        let clear_all = RawEvent::Clear(ClearCommand { plant_id: None, timestamp: ts(0) });
        assert_eq!(
            normalize(&clear_all, &registry(), &marks, None).unwrap(),
            Normalized::Clear(ClearScope::All)
        );
        assert_eq!(route(&clear_all, &registry()).unwrap(), Route::Broadcast);
    }

    #[test]
    fn test_clear_never_advances_watermarks() {
        let mut marks = Watermarks::default();
        marks.advance(&Normalized::Clear(ClearScope::All));
        assert_eq!(marks, Watermarks::default());

        let Ok(reading) = normalize(&tick("RJ01", 3, 5.0), &registry(), &marks, None) else {
            panic!("expected reading");
        };
        marks.advance(&reading);
        assert_eq!(marks.last_reading, Some(ts(3)));
        assert_eq!(marks.last_weather, None);
    }
}

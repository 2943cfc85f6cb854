//! Synthetic Telemetry Generator
//!
//! Seeded clear-sky plus cloud model for every registered plant. Produces one
//! telemetry tick per plant per step and a weather observation every
//! `weather_every_ticks` steps. Injected faults shape the generated signal
//! until the plant is cleared.
//!
//! GHI = 1000 · sin(π (h − 6) / 12) · (1 − 0.8 · cloud) · U(0.95, 1.05)

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::acquisition::solar_hour_at;
use crate::config::{defaults, SimulationConfig};
use crate::registry::{PlantRegistry, PlantSpec};
use crate::types::{FaultInjection, FaultType, RawEvent, TelemetryTick, WeatherObservation};

/// Per-plant weather and fault state.
#[derive(Debug, Clone, Default)]
struct SiteState {
    base_cloud: f64,
    cloud_boost: f64,
    inverter_fault: bool,
    sensor_dropout: bool,
}

impl SiteState {
    fn cloud(&self) -> f64 {
        (self.base_cloud + self.cloud_boost).clamp(0.0, 1.0)
    }
}

/// Deterministic event generator for demos and soak runs.
pub struct SyntheticGenerator {
    plants: Vec<Arc<PlantSpec>>,
    sites: HashMap<String, SiteState>,
    rng: StdRng,
    clock: DateTime<Utc>,
    tick_interval: Duration,
    weather_every: u64,
    ticks: u64,
}

impl SyntheticGenerator {
    pub fn new(registry: &PlantRegistry, config: &SimulationConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let plants: Vec<_> = registry.iter().cloned().collect();
        let sites = plants
            .iter()
            .map(|p| {
                let site = SiteState {
                    base_cloud: rng.gen_range(0.0..0.3),
                    ..SiteState::default()
                };
                (p.id.clone(), site)
            })
            .collect();

        // Start the clock so the first tick lands on the configured local
        // hour in India Standard Time.
        let epoch = Utc
            .with_ymd_and_hms(2026, 3, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let start_offset_secs = ((config.start_solar_hour - defaults::UTC_OFFSET_HOURS) * 3600.0).round();
        #[allow(clippy::cast_possible_truncation)]
        let clock = epoch + Duration::seconds(start_offset_secs as i64);

        Self {
            plants,
            sites,
            rng,
            clock,
            tick_interval: Duration::seconds(i64::try_from(config.tick_interval_secs).unwrap_or(10)),
            weather_every: config.weather_every_ticks.max(1),
            ticks: 0,
        }
    }

    /// Simulated time of the next batch.
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Produce the next batch of events (one tick per plant, plus weather).
    pub fn next_batch(&mut self) -> Vec<RawEvent> {
        self.ticks += 1;
        self.clock += self.tick_interval;
        let emit_weather = self.ticks % self.weather_every == 0;

        let plants = self.plants.clone();
        let mut events = Vec::with_capacity(plants.len() * 2);
        for plant in &plants {
            let (tick, weather) = self.sample_plant(plant);
            if emit_weather {
                events.push(RawEvent::Weather(weather));
            }
            events.push(RawEvent::Telemetry(tick));
        }
        events
    }

    fn sample_plant(&mut self, plant: &PlantSpec) -> (TelemetryTick, WeatherObservation) {
        let drift = self.rng.gen_range(-0.02..0.02);
        let site = self.sites.entry(plant.id.clone()).or_default();
        site.base_cloud = (site.base_cloud + drift).clamp(0.0, 0.6);
        let site = site.clone();

        let hour = solar_hour_at(self.clock, plant.utc_offset_hours);
        let cloud = site.cloud();
        let ghi = clear_sky_ghi(hour) * (1.0 - 0.8 * cloud) * self.rng.gen_range(0.95..1.05);

        let inverter_eff = if site.inverter_fault {
            self.rng.gen_range(0.88..0.92)
        } else {
            defaults::INVERTER_EFFICIENCY
        };

        let area_m2 = plant.nameplate_mw * defaults::PANEL_AREA_M2_PER_MW;
        let dc_mw = ghi * area_m2 * defaults::PANEL_EFFICIENCY / 1e6;
        let ac_mw = if site.sensor_dropout {
            0.0
        } else {
            (dc_mw * inverter_eff).clamp(0.0, plant.nameplate_mw)
        };

        let noise: f64 = self.rng.sample(StandardNormal);
        let temp_c = 24.0 + 10.0 * clear_sky_ghi(hour) / 1000.0 + 0.5 * noise;
        let wind = self.rng.gen_range(1.0..6.0);

        let tick = TelemetryTick {
            plant_id: plant.id.clone(),
            timestamp: self.clock,
            ac_power_mw: ac_mw,
            ghi_wm2: Some(ghi),
            cloud_fraction: Some(cloud),
            temp_c: Some(temp_c),
            wind_speed_ms: Some(wind),
            solar_hour: Some(hour),
            inverter_efficiency: Some(inverter_eff),
        };
        let weather = WeatherObservation {
            plant_id: plant.id.clone(),
            timestamp: self.clock,
            cloud_fraction: cloud,
            temp_c,
            wind_speed_ms: wind,
            ghi_wm2: Some(ghi),
        };
        (tick, weather)
    }

    /// Apply an injected fault to the generated signal.
    ///
    /// Demand spikes do not change generation; they are handled downstream.
    pub fn apply_fault(&mut self, fault: &FaultInjection) {
        let Some(site) = self.sites.get_mut(&fault.plant_id) else {
            return;
        };
        match fault.fault_type {
            FaultType::Cloud => site.cloud_boost = fault.severity.cloud_increment(),
            FaultType::InverterFault => site.inverter_fault = true,
            FaultType::SensorDropout => site.sensor_dropout = true,
            FaultType::DemandSpike => {}
        }
    }

    /// Remove injected faults for one plant, or all plants when `None`.
    pub fn clear(&mut self, plant_id: Option<&str>) {
        for (id, site) in &mut self.sites {
            if plant_id.map_or(true, |p| p == id) {
                site.cloud_boost = 0.0;
                site.inverter_fault = false;
                site.sensor_dropout = false;
            }
        }
    }

    /// Plants with at least one injected fault shaping their signal.
    pub fn active_fault_count(&self) -> usize {
        self.sites
            .values()
            .filter(|s| s.cloud_boost > 0.0 || s.inverter_fault || s.sensor_dropout)
            .count()
    }
}

/// Clear-sky global horizontal irradiance (W/m²) at a local solar hour.
pub fn clear_sky_ghi(solar_hour: f64) -> f64 {
    if (6.0..=18.0).contains(&solar_hour) {
        defaults::REFERENCE_IRRADIANCE_WM2 * (PI * (solar_hour - 6.0) / 12.0).sin()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reference_plants;
    use crate::types::Severity;

    fn generator(seed: u64) -> SyntheticGenerator {
        let registry = PlantRegistry::from_config(&reference_plants()).unwrap();
        let config = SimulationConfig {
            seed,
            start_solar_hour: 11.0,
            ..SimulationConfig::default()
        };
        SyntheticGenerator::new(&registry, &config)
    }

    fn telemetry(events: &[RawEvent], plant: &str) -> TelemetryTick {
        events
            .iter()
            .find_map(|e| match e {
                RawEvent::Telemetry(t) if t.plant_id == plant => Some(t.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_same_seed_same_events() {
        let mut a = generator(7);
        let mut b = generator(7);
        for _ in 0..10 {
            assert_eq!(a.next_batch(), b.next_batch());
        }
    }

    #[test]
    fn test_weather_every_third_tick() {
        let mut sim = generator(1);
        let counts: Vec<usize> = (0..6)
            .map(|_| {
                sim.next_batch()
                    .iter()
                    .filter(|e| matches!(e, RawEvent::Weather(_)))
                    .count()
            })
            .collect();
        assert_eq!(counts, vec![0, 0, 3, 0, 0, 3]);
    }

    #[test]
    fn test_clear_sky_shape() {
        assert_eq!(clear_sky_ghi(5.0), 0.0);
        assert!((clear_sky_ghi(12.0) - 1000.0).abs() < 1e-9);
        assert_eq!(clear_sky_ghi(19.0), 0.0);
    }

    #[test]
    fn test_midday_output_bounded_by_nameplate() {
        let mut sim = generator(3);
        let batch = sim.next_batch();
        let rj = telemetry(&batch, "RJ01");
        assert!(rj.ac_power_mw > 0.0);
        assert!(rj.ac_power_mw <= 100.0);
    }

    #[test]
    fn test_sensor_dropout_zeroes_output_until_cleared() {
        let mut sim = generator(5);
        sim.apply_fault(&FaultInjection {
            plant_id: "GJ01".to_string(),
            timestamp: sim.clock(),
            fault_type: FaultType::SensorDropout,
            severity: Severity::High,
        });
        assert_eq!(sim.active_fault_count(), 1);
        assert_eq!(telemetry(&sim.next_batch(), "GJ01").ac_power_mw, 0.0);

        sim.clear(None);
        assert_eq!(sim.active_fault_count(), 0);
        assert!(telemetry(&sim.next_batch(), "GJ01").ac_power_mw > 0.0);
    }

    #[test]
    fn test_cloud_fault_raises_cloud_fraction() {
        let mut sim = generator(9);
        let before = telemetry(&sim.next_batch(), "TN01").cloud_fraction.unwrap();
        sim.apply_fault(&FaultInjection {
            plant_id: "TN01".to_string(),
            timestamp: sim.clock(),
            fault_type: FaultType::Cloud,
            severity: Severity::High,
        });
        let after = telemetry(&sim.next_batch(), "TN01").cloud_fraction.unwrap();
        assert!(after > before + 0.5);
    }
}

//! Property-based tests for decision loop invariants.
//!
//! Random reading sequences (including irradiance spikes, zero output and
//! non-finite weather fields) are pushed through a fresh plant pipeline and
//! every emitted forecast and decision is checked.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use renewcast::anomaly::AnomalyDetector;
use renewcast::compliance::{self, ComplianceState, ConstraintTable};
use renewcast::config::{reference_plants, AnomalyConfig, ForecastConfig, PolicyConfig, PolicyMode};
use renewcast::emitter::DecisionEmitter;
use renewcast::forecast::WindowedForecaster;
use renewcast::pipeline::{PipelineContext, PlantPipeline};
use renewcast::policy::{DispatchPolicy, PolicyHandle, PolicyModel};
use renewcast::registry::PlantRegistry;
use renewcast::types::{Allocation, DecisionStatus, RawEvent, TelemetryTick};

const PLANTS: [&str; 3] = ["RJ01", "GJ01", "TN01"];

/// One telemetry sample: (ghi, output, cloud, weather dropout).
type Sample = (f64, f64, f64, bool);

fn arb_sample() -> impl Strategy<Value = Sample> {
    (
        prop_oneof![
            4 => 0.0f64..1_100.0,
            1 => Just(0.0),
            1 => 1_500.0f64..5_000.0, // sensor spike
        ],
        prop_oneof![
            4 => 0.0f64..120.0,
            1 => Just(0.0),
            1 => 500.0f64..10_000.0, // metering spike
        ],
        0.0f64..1.0,
        prop::bool::weighted(0.1),
    )
}

fn arb_policy_mode() -> impl Strategy<Value = PolicyMode> {
    prop_oneof![Just(PolicyMode::Learned), Just(PolicyMode::Rule)]
}

fn pipeline(plant: &str, mode: PolicyMode) -> PlantPipeline {
    let registry = Arc::new(PlantRegistry::from_config(&reference_plants()).unwrap());
    // Records are dropped; only returned outcomes are checked.
    let (emitter, _outbox) = DecisionEmitter::channel(false);
    let policy_config = PolicyConfig {
        mode,
        ..PolicyConfig::default()
    };
    let ctx = PipelineContext::new(
        registry,
        WindowedForecaster::new(ForecastConfig::default()),
        DispatchPolicy::from_config(&policy_config, PolicyHandle::new(Some(PolicyModel::builtin()))),
        AnomalyDetector::new(AnomalyConfig::default()),
        emitter,
    );
    PlantPipeline::new(Arc::new(ctx), plant).unwrap()
}

fn tick(plant: &str, i: usize, (ghi, mw, cloud, dropout): Sample) -> RawEvent {
    RawEvent::Telemetry(TelemetryTick {
        plant_id: plant.to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap() + Duration::seconds(10 * i as i64),
        ac_power_mw: mw,
        ghi_wm2: Some(if dropout { f64::NAN } else { ghi }),
        cloud_fraction: Some(cloud),
        temp_c: Some(30.0),
        wind_speed_ms: Some(3.0),
        solar_hour: None,
        inverter_efficiency: None,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// p_low <= p_median <= p_high, all inside [0, nameplate], for every reading.
    #[test]
    fn prop_forecast_band_is_ordered(
        plant in prop::sample::select(PLANTS.to_vec()),
        mode in arb_policy_mode(),
        samples in prop::collection::vec(arb_sample(), 1..60),
    ) {
        let mut p = pipeline(plant, mode);
        let nameplate = p.state().spec.nameplate_mw;
        for (i, sample) in samples.into_iter().enumerate() {
            let outcome = p.handle(&tick(plant, i, sample)).unwrap();
            let f = outcome.forecast().unwrap();
            prop_assert!(f.p_low <= f.p_median && f.p_median <= f.p_high, "unordered band {:?}", f);
            prop_assert!(f.p_low >= 0.0 && f.p_high <= nameplate, "band outside plant range {:?}", f);
        }
    }

    /// Approved MW never moves by more than max_ramp between consecutive
    /// decisions, and a held decision's final MW is within one ramp step of
    /// the last approved value.
    #[test]
    fn prop_approved_decisions_respect_ramp(
        plant in prop::sample::select(PLANTS.to_vec()),
        mode in arb_policy_mode(),
        samples in prop::collection::vec(arb_sample(), 1..60),
    ) {
        let mut p = pipeline(plant, mode);
        let max_ramp = p.state().spec.max_ramp_mw;
        let capacity = p.state().spec.backup_capacity_mw;
        let mut last_approved = 0.0_f64;

        for (i, sample) in samples.into_iter().enumerate() {
            let outcome = p.handle(&tick(plant, i, sample)).unwrap();
            let Some(d) = outcome.decision() else { continue };
            prop_assert!(d.final_mw >= 0.0 && d.final_mw <= capacity + 1e-9);
            prop_assert!((d.final_mw - last_approved).abs() <= max_ramp + 1e-6,
                "final {} vs last approved {}", d.final_mw, last_approved);
            if d.status == DecisionStatus::Approved {
                last_approved = d.final_mw;
            }
        }
    }

    /// Held decisions carry exactly one reason, approved decisions none.
    #[test]
    fn prop_decisions_are_well_formed(
        plant in prop::sample::select(PLANTS.to_vec()),
        mode in arb_policy_mode(),
        samples in prop::collection::vec(arb_sample(), 1..60),
    ) {
        let mut p = pipeline(plant, mode);
        for (i, sample) in samples.into_iter().enumerate() {
            let outcome = p.handle(&tick(plant, i, sample)).unwrap();
            if let Some(d) = outcome.decision() {
                prop_assert!(d.is_well_formed(), "{:?}", d);
                prop_assert_eq!(d.reason.is_some(), d.is_held());
            }
        }
    }

    /// The gate alone: any requested MW (even non-finite) yields a decision
    /// inside [0, capacity].
    #[test]
    fn prop_gate_output_within_capacity(
        requested in prop_oneof![
            8 => -500.0f64..500.0,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
        ],
        last in 0.0f64..100.0,
    ) {
        let registry = PlantRegistry::from_config(&reference_plants()).unwrap();
        let table = ConstraintTable::from_registry(&registry);
        let allocation = Allocation {
            plant_id: "RJ01".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            candidate_asset: "Suratgarh_Gas".to_string(),
            candidate_mw: requested,
            source_policy_version: "rule-v1".to_string(),
            deficit_mw: 0.0,
            spinning_reserve_mw: 5.0,
            fallback: false,
        };
        let state = ComplianceState { last_approved_mw: last, ..ComplianceState::default() };
        let d = compliance::evaluate(&state, &allocation, &table).unwrap();
        prop_assert!(d.final_mw >= 0.0 && d.final_mw <= 100.0);
        prop_assert!(d.is_well_formed());
    }
}

//! Config Validation Tests
//!
//! Operator-facing behaviour of `renewcast.toml`: typo detection with
//! suggestions, range validation, and fatal startup errors for broken plant
//! constraints. Exercised through the public loading API only.

#![allow(clippy::unwrap_used)]

use std::io::Write;

use renewcast::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use renewcast::config::{ConfigError, PolicyMode, RenewcastConfig, StorageBackend};
use renewcast::registry::PlantRegistry;
use renewcast::types::AssetKind;

const OPERATOR_FILE: &str = r#"
[server]
addr = "127.0.0.1:9090"

[storage]
data_dir = "/var/lib/renewcast"
backend = "memory"
record_forecasts = false

[policy]
mode = "rule"
risk_aversion = 0.5

[simulation]
seed = 7

[[plants]]
id = "KA01"
name = "Pavagada Solar Park"
region = "Karnataka"
nameplate_mw = 120.0
backup_capacity_mw = 90.0
committed_mw = 100.0
max_ramp_mw = 30.0
must_run_floor_mw = 15.0

[[plants.assets]]
id = "KA_Battery_01"
kind = "battery"
capacity_mw = 40.0
lead_time_min = 1

[[plants.assets]]
id = "KA_Hydro_01"
kind = "hydro"
capacity_mw = 60.0
must_run = true
merit_class = 2
"#;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn operator_file_replaces_reference_plants() {
    let file = write_temp(OPERATOR_FILE);
    let config = RenewcastConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.server.addr, "127.0.0.1:9090");
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert!(!config.storage.record_forecasts);
    assert_eq!(config.policy.mode, PolicyMode::Rule);
    assert_eq!(config.policy.risk_aversion, 0.5);
    assert_eq!(config.simulation.seed, 7);
    // sections not present keep their defaults
    assert_eq!(config.forecast, RenewcastConfig::default().forecast);

    let registry = PlantRegistry::from_config(&config.plants).unwrap();
    assert_eq!(registry.len(), 1);
    let plant = registry.get("KA01").unwrap();
    assert_eq!(plant.assets.len(), 2);
    assert_eq!(plant.assets[0].kind, AssetKind::Battery);
    assert!(plant.assets[1].must_run);
    assert!(!registry.contains("RJ01"));
}

#[test]
fn missing_file_is_io_error() {
    let err = RenewcastConfig::load_from_file(std::path::Path::new("/nonexistent/renewcast.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn unparseable_file_reports_its_path() {
    let file = write_temp("[[plants]]\nid = \"XX01\"\nnameplate_mw = \"lots\"\n");
    let err = RenewcastConfig::load_from_file(file.path()).unwrap_err();
    match err {
        ConfigError::Parse(path, _) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other}"),
    }
}

#[test]
fn dumped_defaults_reload_identically() {
    let defaults = RenewcastConfig::default();
    let file = write_temp(&defaults.to_toml().unwrap());
    let reloaded = RenewcastConfig::load_from_file(file.path()).unwrap();
    assert_eq!(reloaded, defaults);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn every_constraint_problem_is_reported_at_once() {
    let toml_str = r#"
[[plants]]
id = "BAD1"
nameplate_mw = 50.0
backup_capacity_mw = 40.0
committed_mw = 45.0
max_ramp_mw = 0.0
must_run_floor_mw = 60.0

[[plants]]
id = "BAD1"
nameplate_mw = 50.0
backup_capacity_mw = 40.0
committed_mw = 45.0
max_ramp_mw = 10.0
must_run_floor_mw = 5.0

[[plants.assets]]
id = "gas"
kind = "gas"
capacity_mw = 40.0
"#;
    let err = RenewcastConfig::from_toml_str(toml_str).unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    let joined = errors.join("\n");
    assert!(joined.contains("duplicate plant id"), "{joined}");
    assert!(joined.contains("max_ramp_mw"), "{joined}");
    assert!(joined.contains("must_run_floor_mw"), "{joined}");
    assert!(joined.contains("at least one backup asset"), "{joined}");
}

#[test]
fn tuning_out_of_range_is_fatal() {
    let toml_str = r#"
[forecast]
quantile_low = 0.6
quantile_high = 0.4

[policy]
risk_aversion = 1.5
"#;
    let err = RenewcastConfig::from_toml_str(toml_str).unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    assert!(errors.iter().any(|e| e.contains("quantiles")));
    assert!(errors.iter().any(|e| e.contains("risk_aversion")));
}

#[test]
fn unknown_policy_mode_fails_to_parse() {
    let err = RenewcastConfig::from_toml_str("[policy]\nmode = \"oracle\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_plant_field_warns_with_suggestion() {
    let toml_str = r#"
[[plants]]
id = "RJ01"
nameplate_mw = 100.0
backup_capacity_mw = 100.0
committed_mw = 85.0
max_ramp_mw = 25.0
must_run_floor_mw = 20.0
must_run_flor_mw = 20.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "plants.must_run_flor_mw");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("plants.must_run_floor_mw"));
}

#[test]
fn typo_in_section_name_warns() {
    let warnings = validate_unknown_keys("[publsh]\nretry_max_ms = 100\n");
    assert!(warnings.iter().any(|w| w.field == "publsh"));
    assert!(warnings.iter().any(|w| w.suggestion.as_deref() == Some("publish")));
}

#[test]
fn typos_never_block_loading() {
    let config = RenewcastConfig::from_toml_str("[simulation]\nsed = 9\n").unwrap();
    assert_eq!(config.simulation.seed, RenewcastConfig::default().simulation.seed);
}

#[test]
fn operator_file_has_no_unknown_keys() {
    assert!(validate_unknown_keys(OPERATOR_FILE).is_empty());
}

#[test]
fn garbage_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("zzzzzzzzzzzzzzzz", &known), None);
}

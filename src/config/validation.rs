//! Config validation: unknown-key warnings and range checks on the tuning
//! sections.
//!
//! The raw file is parsed into a `toml::Value` first and every dotted key
//! path is checked against the fields `RenewcastConfig` understands. Unknown
//! keys become warnings, with a suggestion drawn from the sibling fields of
//! the same section. Loading then continues with serde; a typo never stops
//! the service.
//!
//! Arrays of tables (`[[plants]]`, `[[plants.assets]]`) are walked with the
//! array's own path as prefix, so every plant contributes `plants.<field>`.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for RenewcastConfig.
///
/// Maintained by hand to match app_config.rs and plants.rs. Any new field
/// must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        // [storage]
        "storage",
        "storage.data_dir",
        "storage.backend",
        "storage.record_forecasts",
        // [forecast]
        "forecast",
        "forecast.horizon_hours",
        "forecast.min_window_samples",
        "forecast.learning_rate",
        "forecast.residual_correction_rate",
        "forecast.low_confidence_widening",
        "forecast.naive_performance_ratio",
        "forecast.quantile_low",
        "forecast.quantile_high",
        // [policy]
        "policy",
        "policy.mode",
        "policy.model_path",
        "policy.watch_model",
        "policy.risk_aversion",
        "policy.deadband_mw",
        "policy.capacity_match_fraction",
        // [anomaly]
        "anomaly",
        "anomaly.range_tolerance_fraction",
        "anomaly.dropout_prior_fraction",
        "anomaly.dropout_floor_fraction",
        "anomaly.dropout_min_irradiance_wm2",
        "anomaly.flatline_samples",
        "anomaly.underperformance_fraction",
        "anomaly.underperformance_intervals",
        // [publish]
        "publish",
        "publish.retry_initial_ms",
        "publish.retry_max_ms",
        "publish.notify_capacity",
        "publish.worker_queue_depth",
        // [simulation]
        "simulation",
        "simulation.seed",
        "simulation.tick_interval_secs",
        "simulation.weather_every_ticks",
        "simulation.start_solar_hour",
        // [[plants]]
        "plants",
        "plants.id",
        "plants.name",
        "plants.region",
        "plants.nameplate_mw",
        "plants.backup_capacity_mw",
        "plants.committed_mw",
        "plants.max_ramp_mw",
        "plants.must_run_floor_mw",
        "plants.merit_class",
        "plants.utc_offset_hours",
        // [[plants.assets]]
        "plants.assets",
        "plants.assets.id",
        "plants.assets.kind",
        "plants.assets.capacity_mw",
        "plants.assets.lead_time_min",
        "plants.assets.must_run",
        "plants.assets.available",
        "plants.assets.merit_class",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1 }, c = [{ d = 2 }] }` yields:
/// `["a", "a.b", "c", "c.d"]` (duplicates across array entries are removed).
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            if !keys.contains(&path) {
                keys.push(path.clone());
            }
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        for nested in walk_toml_keys(item, &path) {
                            if !keys.contains(&nested) {
                                keys.push(nested);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Key Suggestions
// ============================================================================

/// Edit distance between two key names (insert, delete, substitute).
///
/// Single rolling row; `diag` carries the previous row's value at `j`.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = diag + usize::from(ca != cb);
            diag = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diag + 1);
        }
    }
    row[b.len()]
}

/// Split `plants.assets.kind` into (`plants.assets`, `kind`).
fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once('.').unwrap_or(("", key))
}

/// Largest edit distance still treated as a typo for a field of this length.
fn typo_budget(field: &str) -> usize {
    (field.chars().count() / 4).max(2)
}

/// Closest known key in the same section as `unknown`.
///
/// Only sibling fields are candidates: a misspelt asset field is never
/// "corrected" to a plant field. Ties resolve alphabetically.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let (section, field) = split_key(unknown);
    let budget = typo_budget(field);
    known
        .iter()
        .filter_map(|candidate| {
            let (candidate_section, candidate_field) = split_key(candidate);
            (candidate_section == section).then(|| (edit_distance(field, candidate_field), *candidate))
        })
        .filter(|(distance, _)| *distance <= budget)
        .min()
        .map(|(_, candidate)| candidate.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate tuning ranges on a parsed RenewcastConfig.
///
/// Returns (errors, warnings): errors are values the loop cannot run with,
/// warnings are legal but suspicious.
pub fn validate_ranges(config: &super::RenewcastConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let f = &config.forecast;
    if !(f.horizon_hours.is_finite() && f.horizon_hours > 0.0) {
        errors.push(format!(
            "forecast.horizon_hours = {} must be finite and > 0",
            f.horizon_hours
        ));
    }
    if f.min_window_samples == 0 {
        errors.push("forecast.min_window_samples must be >= 1".to_string());
    }
    if !(f.learning_rate.is_finite() && f.learning_rate > 0.0 && f.learning_rate <= 1.0) {
        errors.push(format!(
            "forecast.learning_rate = {} must lie in (0, 1]",
            f.learning_rate
        ));
    }
    if !(0.0..=1.0).contains(&f.residual_correction_rate) {
        errors.push(format!(
            "forecast.residual_correction_rate = {} must lie in [0, 1]",
            f.residual_correction_rate
        ));
    }
    if !(f.quantile_low > 0.0 && f.quantile_low < 0.5 && f.quantile_high > 0.5 && f.quantile_high < 1.0) {
        errors.push(format!(
            "forecast quantiles ({}, {}) must satisfy 0 < low < 0.5 < high < 1",
            f.quantile_low, f.quantile_high
        ));
    }
    if !(0.0..=1.0).contains(&f.low_confidence_widening) {
        errors.push(format!(
            "forecast.low_confidence_widening = {} must lie in [0, 1]",
            f.low_confidence_widening
        ));
    }

    let p = &config.policy;
    if !(0.0..=1.0).contains(&p.risk_aversion) {
        errors.push(format!(
            "policy.risk_aversion = {} must lie in [0, 1]",
            p.risk_aversion
        ));
    }
    if !(p.deadband_mw.is_finite() && p.deadband_mw >= 0.0) {
        errors.push(format!("policy.deadband_mw = {} cannot be negative", p.deadband_mw));
    }
    if !(0.0..=1.0).contains(&p.capacity_match_fraction) {
        errors.push(format!(
            "policy.capacity_match_fraction = {} must lie in [0, 1]",
            p.capacity_match_fraction
        ));
    }

    let a = &config.anomaly;
    if !(a.range_tolerance_fraction.is_finite() && a.range_tolerance_fraction >= 0.0) {
        errors.push(format!(
            "anomaly.range_tolerance_fraction = {} cannot be negative",
            a.range_tolerance_fraction
        ));
    }
    if a.flatline_samples < 2 {
        errors.push("anomaly.flatline_samples must be >= 2".to_string());
    }
    if a.dropout_floor_fraction >= a.dropout_prior_fraction {
        errors.push(format!(
            "anomaly.dropout_floor_fraction ({}) must be below dropout_prior_fraction ({})",
            a.dropout_floor_fraction, a.dropout_prior_fraction
        ));
    }

    let pb = &config.publish;
    if pb.retry_initial_ms == 0 || pb.retry_initial_ms > pb.retry_max_ms {
        errors.push(format!(
            "publish.retry_initial_ms ({}) must be > 0 and <= retry_max_ms ({})",
            pb.retry_initial_ms, pb.retry_max_ms
        ));
    }
    if pb.notify_capacity == 0 || pb.worker_queue_depth == 0 {
        errors.push("publish.notify_capacity and worker_queue_depth must be >= 1".to_string());
    }

    if config.simulation.tick_interval_secs == 0 {
        errors.push("simulation.tick_interval_secs must be >= 1".to_string());
    }

    // Suspicious but legal
    if f.horizon_hours > 24.0 {
        warnings.push(ValidationWarning {
            field: "forecast.horizon_hours".to_string(),
            message: format!(
                "forecast.horizon_hours = {} spans more than a day of diurnal cycle",
                f.horizon_hours
            ),
            suggestion: None,
        });
    }
    for plant in &config.plants {
        if plant.committed_mw > plant.nameplate_mw {
            warnings.push(ValidationWarning {
                field: format!("plants.{}.committed_mw", plant.id),
                message: format!(
                    "plant {} commits {:.1} MW above its {:.1} MW nameplate; backup will run continuously",
                    plant.id, plant.committed_mw, plant.nameplate_mw
                ),
                suggestion: None,
            });
        }
        if plant.max_ramp_mw > plant.backup_capacity_mw {
            warnings.push(ValidationWarning {
                field: format!("plants.{}.max_ramp_mw", plant.id),
                message: format!(
                    "plant {} ramp limit {:.1} MW exceeds backup capacity; ramp check never binds",
                    plant.id, plant.max_ramp_mw
                ),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenewcastConfig;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("ramp", "ramp"), 0);
        assert_eq!(edit_distance("max_ramp_mv", "max_ramp_mw"), 1);
        assert_eq!(edit_distance("capacity", "capcity"), 1);
        assert_eq!(edit_distance("", "kind"), 4);
        assert_eq!(edit_distance("kind", ""), 4);
    }

    #[test]
    fn test_suggestion_stays_within_section() {
        let known = known_config_keys();
        assert_eq!(
            suggest_correction("plants.assets.capacty_mw", &known).as_deref(),
            Some("plants.assets.capacity_mw")
        );
        // `merit_clas` exists under both plants and assets; the section decides.
        assert_eq!(
            suggest_correction("plants.merit_clas", &known).as_deref(),
            Some("plants.merit_class")
        );
        assert_eq!(suggest_correction("plants.assets.nameplate_mw", &known), None);
    }

    #[test]
    fn test_walk_toml_keys_descends_into_plant_arrays() {
        let toml: toml::Value = r#"
[[plants]]
id = "RJ01"
[[plants.assets]]
id = "RJ_Hydro_01"
[[plants]]
id = "GJ01"
"#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"plants".to_string()));
        assert!(keys.contains(&"plants.id".to_string()));
        assert!(keys.contains(&"plants.assets.id".to_string()));
        assert_eq!(keys.iter().filter(|k| *k == "plants.id").count(), 1);
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[forecast]
horizon_hour = 6.0
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("forecast.horizon_hours")
        );
    }

    #[test]
    fn test_typo_inside_plant_array() {
        let warnings = validate_unknown_keys(
            r#"
[[plants]]
id = "RJ01"
max_ramp_mv = 20.0
"#,
        );
        assert!(warnings
            .iter()
            .any(|w| w.suggestion.as_deref() == Some("plants.max_ramp_mw")));
    }

    #[test]
    fn test_serialized_defaults_produce_zero_warnings() {
        let text = RenewcastConfig::default().to_toml().unwrap();
        let warnings = validate_unknown_keys(&text);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_ranges_defaults_clean() {
        let (errors, warnings) = validate_ranges(&RenewcastConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_crossed_quantiles_rejected() {
        let mut config = RenewcastConfig::default();
        config.forecast.quantile_low = 0.6;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("quantiles")));
    }

    #[test]
    fn test_risk_aversion_out_of_range() {
        let mut config = RenewcastConfig::default();
        config.policy.risk_aversion = 1.5;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("risk_aversion")));
    }

    #[test]
    fn test_over_committed_plant_warns() {
        let mut config = RenewcastConfig::default();
        config.plants[0].committed_mw = 150.0;
        let (_, warnings) = validate_ranges(&config);
        assert!(warnings.iter().any(|w| w.field.contains("committed_mw")));
    }
}

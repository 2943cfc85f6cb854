use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Ingestion Events
// ============================================================================

/// Event as delivered by an ingestion adapter, before normalization.
///
/// Serialized with a `kind` tag so JSONL replay files and the HTTP
/// injection endpoint share one format:
///
/// ```json
/// {"kind":"telemetry","plant_id":"RJ01","timestamp":"2026-03-01T06:30:00Z","ac_power_mw":41.2}
/// {"kind":"fault","plant_id":"GJ01","timestamp":"...","fault_type":"inverter_fault","severity":"high"}
/// {"kind":"clear","timestamp":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    /// Synthetic or metered sensor tick
    Telemetry(TelemetryTick),
    /// Weather poll result
    Weather(WeatherObservation),
    /// Out-of-band fault injection
    Fault(FaultInjection),
    /// Reset one plant or all plants
    Clear(ClearCommand),
}

impl RawEvent {
    /// Plant named by the event (`None` for a clear-all command).
    pub fn plant_id(&self) -> Option<&str> {
        match self {
            RawEvent::Telemetry(t) => Some(&t.plant_id),
            RawEvent::Weather(w) => Some(&w.plant_id),
            RawEvent::Fault(f) => Some(&f.plant_id),
            RawEvent::Clear(c) => c.plant_id.as_deref(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RawEvent::Telemetry(t) => t.timestamp,
            RawEvent::Weather(w) => w.timestamp,
            RawEvent::Fault(f) => f.timestamp,
            RawEvent::Clear(c) => c.timestamp,
        }
    }

    /// Short label for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawEvent::Telemetry(_) => "telemetry",
            RawEvent::Weather(_) => "weather",
            RawEvent::Fault(_) => "fault",
            RawEvent::Clear(_) => "clear",
        }
    }

    /// True for fault and clear commands.
    pub fn is_control(&self) -> bool {
        matches!(self, RawEvent::Fault(_) | RawEvent::Clear(_))
    }
}

/// Sensor tick from a plant's SCADA feed or the synthetic generator.
///
/// Only the metered output is mandatory; missing weather fields are filled
/// from the plant's latest weather observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryTick {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub ac_power_mw: f64,
    #[serde(default)]
    pub ghi_wm2: Option<f64>,
    #[serde(default)]
    pub cloud_fraction: Option<f64>,
    #[serde(default)]
    pub temp_c: Option<f64>,
    #[serde(default)]
    pub wind_speed_ms: Option<f64>,
    /// Local solar hour; derived from the timestamp and plant UTC offset when absent
    #[serde(default)]
    pub solar_hour: Option<f64>,
    #[serde(default)]
    pub inverter_efficiency: Option<f64>,
}

/// Weather poll result for a plant location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub cloud_fraction: f64,
    pub temp_c: f64,
    #[serde(default)]
    pub wind_speed_ms: f64,
    #[serde(default)]
    pub ghi_wm2: Option<f64>,
}

/// Injected fault command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInjection {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub fault_type: FaultType,
    pub severity: Severity,
}

/// Reset command; `plant_id = None` clears every plant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCommand {
    #[serde(default)]
    pub plant_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Fault Taxonomy
// ============================================================================

/// Kinds of fault that can be injected into a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    /// Sudden cloud bank over the plant
    Cloud,
    /// Inverter efficiency collapse
    InverterFault,
    /// Grid demand rises above the committed schedule
    DemandSpike,
    /// Metering feed drops to zero
    SensorDropout,
}

impl std::fmt::Display for FaultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultType::Cloud => write!(f, "cloud"),
            FaultType::InverterFault => write!(f, "inverter_fault"),
            FaultType::DemandSpike => write!(f, "demand_spike"),
            FaultType::SensorDropout => write!(f, "sensor_dropout"),
        }
    }
}

/// Severity shared by injected faults and anomaly reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    /// Extra cloud fraction added by a cloud event of this severity.
    pub fn cloud_increment(self) -> f64 {
        match self {
            Severity::Low => 0.3,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
        }
    }

    /// Fractional uplift on committed demand for a demand spike.
    pub fn demand_uplift_fraction(self) -> f64 {
        match self {
            Severity::Low => 0.10,
            Severity::Medium => 0.20,
            Severity::High => 0.35,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

//! RenewCast Event Injection
//!
//! Posts fault and clear commands to a running RenewCast instance. The effect
//! shows up in the anomalies stream and, for demand spikes, in the next
//! dispatch decisions.
//!
//! # Usage
//! ```bash
//! ./renewcast-inject fault GJ01 cloud --severity high
//! ./renewcast-inject fault RJ01 demand-spike --severity medium
//! ./renewcast-inject clear --plant GJ01
//! ./renewcast-inject clear
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use renewcast::types::{ClearCommand, FaultInjection, FaultType, RawEvent, Severity};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "renewcast-inject")]
#[command(about = "Inject faults and clear commands into a running RenewCast")]
#[command(version)]
struct Args {
    /// RenewCast base URL
    #[arg(long, env = "RENEWCAST_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Event timestamp (RFC 3339). Faults default to just after the plant's
    /// latest accepted reading so they are not rejected as stale.
    #[arg(long)]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inject a fault into one plant
    Fault {
        /// Plant id (e.g. GJ01)
        plant: String,
        /// Fault type
        #[arg(value_enum)]
        fault_type: FaultArg,
        #[arg(long, value_enum, default_value = "medium")]
        severity: SeverityArg,
    },
    /// Reset one plant, or every plant when --plant is omitted
    Clear {
        #[arg(long)]
        plant: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FaultArg {
    Cloud,
    InverterFault,
    DemandSpike,
    SensorDropout,
}

impl From<FaultArg> for FaultType {
    fn from(arg: FaultArg) -> Self {
        match arg {
            FaultArg::Cloud => FaultType::Cloud,
            FaultArg::InverterFault => FaultType::InverterFault,
            FaultArg::DemandSpike => FaultType::DemandSpike,
            FaultArg::SensorDropout => FaultType::SensorDropout,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    Low,
    Medium,
    High,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
        }
    }
}

/// Offset past the plant clock for a default-stamped fault.
const FAULT_CLOCK_STEP_MS: i64 = 1;

fn target_plant(command: &Command) -> Option<&str> {
    match command {
        Command::Fault { plant, .. } => Some(plant),
        Command::Clear { .. } => None,
    }
}

/// Fault timestamp from a plant's stream clock, falling back to now for a
/// plant that has not accepted anything yet.
fn stamp_after(stream_clock: Option<DateTime<Utc>>) -> DateTime<Utc> {
    stream_clock.map_or_else(Utc::now, |clock| clock + chrono::Duration::milliseconds(FAULT_CLOCK_STEP_MS))
}

/// Read `data.status.stream_clock` from `GET /api/v1/plants/:id`.
async fn plant_stream_clock(http: &reqwest::Client, base: &str, plant: &str) -> Result<Option<DateTime<Utc>>> {
    let resp = http
        .get(format!("{base}/api/v1/plants/{plant}"))
        .send()
        .await
        .with_context(|| format!("Failed to connect to RenewCast at {base}"))?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("no details");
        return Err(anyhow::anyhow!("Plant lookup failed (HTTP {status}): {message}"));
    }
    let clock = body["data"]["status"]["stream_clock"]
        .as_str()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
    Ok(clock)
}

fn build_event(command: Command, timestamp: DateTime<Utc>) -> RawEvent {
    match command {
        Command::Fault {
            plant,
            fault_type,
            severity,
        } => RawEvent::Fault(FaultInjection {
            plant_id: plant,
            timestamp,
            fault_type: fault_type.into(),
            severity: severity.into(),
        }),
        Command::Clear { plant } => RawEvent::Clear(ClearCommand {
            plant_id: plant,
            timestamp,
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let base = args.url.trim_end_matches('/');

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let timestamp = match (args.at, target_plant(&args.command)) {
        (Some(at), _) => at,
        (None, Some(plant)) => stamp_after(plant_stream_clock(&http, base, plant).await?),
        (None, None) => Utc::now(),
    };
    let event = build_event(args.command, timestamp);

    let resp = http
        .post(format!("{base}/api/v1/events"))
        .json(&event)
        .send()
        .await
        .with_context(|| format!("Failed to connect to RenewCast at {base}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("no details");
        return Err(anyhow::anyhow!("Injection rejected (HTTP {status}): {message}"));
    }

    println!(
        "✓ {} accepted for {}",
        event.kind_name(),
        event.plant_id().unwrap_or("all plants")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_event_wire_format() {
        let event = build_event(
            Command::Fault {
                plant: "GJ01".to_string(),
                fault_type: FaultArg::DemandSpike,
                severity: SeverityArg::High,
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "fault");
        assert_eq!(json["fault_type"], "demand_spike");
        assert_eq!(json["severity"], "high");
    }

    #[test]
    fn test_default_fault_stamp_follows_plant_clock() {
        let clock = "2026-03-01T06:33:10Z".parse::<DateTime<Utc>>().unwrap();
        let stamped = stamp_after(Some(clock));
        assert!(stamped > clock);
        assert!(stamped - clock < chrono::Duration::seconds(1));
    }

    #[test]
    fn test_clear_without_plant_targets_all() {
        let event = build_event(Command::Clear { plant: None }, Utc::now());
        assert_eq!(event.plant_id(), None);
        assert_eq!(event.kind_name(), "clear");
    }
}

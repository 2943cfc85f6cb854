//! API route handlers
//!
//! Read side: health summary, plant registry and status, and the tail of
//! each output stream. Write side: event injection into the running loop.
//! Live side: server-sent events for every published record.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults;
use crate::pipeline::{AppState, ControlSender, PlantSummary};
use crate::policy::PolicyHandle;
use crate::registry::{PlantRegistry, PlantSpec};
use crate::storage::{LogRecord, OutputLogs, StreamCounts, StreamKind};
use crate::types::{AssetKind, MeritClass, RawEvent};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<RwLock<AppState>>,
    pub registry: Arc<PlantRegistry>,
    pub logs: OutputLogs,
    pub notify: broadcast::Sender<LogRecord>,
    /// Injection channel into the processing loop
    pub control: ControlSender,
    pub policy: PolicyHandle,
    /// Ends live streams so graceful HTTP shutdown can complete
    pub shutdown: CancellationToken,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub source: String,
    pub policy_variant: String,
    pub policy_version: Option<String>,
    pub storage_backend: &'static str,
    pub records: StreamCounts,
    pub events_routed: u64,
    pub events_unroutable: u64,
    pub live_subscribers: usize,
    pub plants: Vec<PlantHealth>,
}

#[derive(Debug, Serialize)]
pub struct PlantHealth {
    pub plant_id: String,
    pub last_update: Option<DateTime<Utc>>,
    pub state_version: u64,
    pub readings: u64,
    pub approved: u64,
    pub held: u64,
    pub anomalies: u64,
    pub rejected: u64,
}

impl From<&PlantSummary> for PlantHealth {
    fn from(s: &PlantSummary) -> Self {
        Self {
            plant_id: s.plant_id.clone(),
            last_update: s.last_update,
            state_version: s.state_version,
            readings: s.counters.readings,
            approved: s.counters.approved,
            held: s.counters.held,
            anomalies: s.counters.anomalies,
            rejected: s.counters.rejected(),
        }
    }
}

/// GET /api/v1/health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let app = state.app_state.read().await;
    ApiResponse::ok(HealthResponse {
        status: app.status.to_string(),
        uptime_secs: app.uptime_secs(),
        source: app.source.clone(),
        policy_variant: app.policy_variant.clone(),
        policy_version: state.policy.version(),
        storage_backend: state.logs.backend_name(),
        records: state.logs.counts(),
        events_routed: app.events_routed,
        events_unroutable: app.events_unroutable,
        live_subscribers: state.notify.receiver_count(),
        plants: app.plants.values().map(PlantHealth::from).collect(),
    })
}

// ============================================================================
// Plants
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AssetView {
    pub id: String,
    pub kind: AssetKind,
    pub capacity_mw: f64,
    pub lead_time_min: u32,
    pub must_run: bool,
    pub available: bool,
    pub merit_class: MeritClass,
}

#[derive(Debug, Serialize)]
pub struct PlantView {
    pub id: String,
    pub name: String,
    pub region: String,
    pub nameplate_mw: f64,
    pub backup_capacity_mw: f64,
    pub committed_mw: f64,
    pub max_ramp_mw: f64,
    pub must_run_floor_mw: f64,
    pub assets: Vec<AssetView>,
    pub status: Option<PlantSummary>,
}

impl PlantView {
    fn new(spec: &PlantSpec, status: Option<PlantSummary>) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            region: spec.region.clone(),
            nameplate_mw: spec.nameplate_mw,
            backup_capacity_mw: spec.backup_capacity_mw,
            committed_mw: spec.committed_mw,
            max_ramp_mw: spec.max_ramp_mw,
            must_run_floor_mw: spec.must_run_floor_mw,
            assets: spec
                .assets
                .iter()
                .map(|a| AssetView {
                    id: a.id.clone(),
                    kind: a.kind,
                    capacity_mw: a.capacity_mw,
                    lead_time_min: a.lead_time_min,
                    must_run: a.must_run,
                    available: a.available,
                    merit_class: a.merit_class,
                })
                .collect(),
            status,
        }
    }
}

/// GET /api/v1/plants
pub async fn get_plants(State(state): State<ApiState>) -> Response {
    let app = state.app_state.read().await;
    let plants: Vec<PlantView> = state
        .registry
        .iter()
        .map(|spec| PlantView::new(spec, app.plants.get(&spec.id).cloned()))
        .collect();
    ApiResponse::list(plants)
}

/// GET /api/v1/plants/:plant_id
pub async fn get_plant(State(state): State<ApiState>, Path(plant_id): Path<String>) -> Response {
    let Some(spec) = state.registry.get(&plant_id) else {
        return ApiErrorResponse::not_found(format!("unknown plant '{plant_id}'"));
    };
    let status = state.app_state.read().await.plants.get(&plant_id).cloned();
    ApiResponse::ok(PlantView::new(spec, status))
}

// ============================================================================
// Output streams
// ============================================================================

/// `?limit=&plant=` for the stream endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TailQuery {
    pub limit: Option<usize>,
    pub plant: Option<String>,
}

impl TailQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(defaults::QUERY_DEFAULT_LIMIT)
            .min(defaults::QUERY_MAX_LIMIT)
    }
}

fn tail(state: &ApiState, kind: StreamKind, query: &TailQuery) -> Response {
    if let Some(plant) = &query.plant {
        if !state.registry.contains(plant) {
            return ApiErrorResponse::not_found(format!("unknown plant '{plant}'"));
        }
    }
    match state.logs.stream(kind).tail(query.limit(), query.plant.as_deref()) {
        Ok(records) => ApiResponse::list(records),
        Err(e) => {
            warn!(stream = %kind, error = %e, "[API] Failed to read stream");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

/// GET /api/v1/decisions/approved
pub async fn get_approved(State(state): State<ApiState>, Query(query): Query<TailQuery>) -> Response {
    tail(&state, StreamKind::Approved, &query)
}

/// GET /api/v1/decisions/held
pub async fn get_held(State(state): State<ApiState>, Query(query): Query<TailQuery>) -> Response {
    tail(&state, StreamKind::Held, &query)
}

/// GET /api/v1/anomalies
pub async fn get_anomalies(State(state): State<ApiState>, Query(query): Query<TailQuery>) -> Response {
    tail(&state, StreamKind::Anomalies, &query)
}

/// GET /api/v1/forecasts
pub async fn get_forecasts(State(state): State<ApiState>, Query(query): Query<TailQuery>) -> Response {
    tail(&state, StreamKind::Forecasts, &query)
}

// ============================================================================
// Event injection
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InjectAck {
    pub accepted: bool,
    pub kind: &'static str,
    pub plant_id: Option<String>,
}

/// POST /api/v1/events
///
/// Accepts any raw event (typically a fault or clear) and queues it for the
/// processing loop. Returns 202; the effect shows up in the output streams.
pub async fn post_event(State(state): State<ApiState>, Json(event): Json<RawEvent>) -> Response {
    if let Some(plant) = event.plant_id() {
        if !state.registry.contains(plant) {
            return ApiErrorResponse::not_found(format!("unknown plant '{plant}'"));
        }
    }

    let ack = InjectAck {
        accepted: true,
        kind: event.kind_name(),
        plant_id: event.plant_id().map(str::to_string),
    };
    info!(kind = ack.kind, plant = ?ack.plant_id, "[API] Event injected");

    match state.control.send(event).await {
        Ok(()) => ApiResponse::accepted(ack),
        Err(_) => ApiErrorResponse::service_unavailable("processing loop is not running"),
    }
}

// ============================================================================
// Live notifications
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub plant: Option<String>,
}

/// GET /api/v1/stream
///
/// Server-sent events, one per published record. The SSE event name is the
/// stream (`approved`, `held`, `anomalies`, `forecasts`) and the id is the
/// record's sequence number.
pub async fn get_stream(State(state): State<ApiState>, Query(query): Query<StreamQuery>) -> impl IntoResponse {
    let rx = state.notify.subscribe();
    Sse::new(record_events(rx, query.plant, state.shutdown)).keep_alive(KeepAlive::default())
}

fn record_events(
    rx: broadcast::Receiver<LogRecord>,
    plant: Option<String>,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold((rx, plant, shutdown), |(mut rx, plant, shutdown)| async move {
        loop {
            let received = tokio::select! {
                () = shutdown.cancelled() => return None,
                received = rx.recv() => received,
            };
            match received {
                Ok(record) => {
                    if plant.as_deref().is_some_and(|p| p != record.plant_id) {
                        continue;
                    }
                    let event = match Event::default()
                        .event(record.stream.as_str())
                        .id(record.seq.to_string())
                        .json_data(&record)
                    {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "[API] Failed to encode live record");
                            continue;
                        }
                    };
                    return Some((Ok(event), (rx, plant, shutdown)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "[API] Live subscriber lagged, records skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Forecast;
    use futures::StreamExt;

    fn record(plant: &str) -> LogRecord {
        LogRecord::forecast(Forecast::sorted(plant, Utc::now(), [1.0, 2.0, 3.0], false, 1))
    }

    #[tokio::test]
    async fn test_live_stream_filters_by_plant() {
        let (tx, rx) = broadcast::channel(8);
        let shutdown = CancellationToken::new();
        let stream = record_events(rx, Some("GJ01".to_string()), shutdown.clone());
        futures::pin_mut!(stream);

        tx.send(record("RJ01")).unwrap();
        tx.send(record("GJ01")).unwrap();

        assert!(stream.next().await.is_some());
        shutdown.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_live_stream_ends_when_publisher_gone() {
        let (tx, rx) = broadcast::channel::<LogRecord>(8);
        let stream = record_events(rx, None, CancellationToken::new());
        futures::pin_mut!(stream);
        drop(tx);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_tail_limit_clamped() {
        let query = TailQuery {
            limit: Some(1_000_000),
            plant: None,
        };
        assert_eq!(query.limit(), defaults::QUERY_MAX_LIMIT);
        assert_eq!(TailQuery::default().limit(), defaults::QUERY_DEFAULT_LIMIT);
    }
}

//! API route definitions
//!
//! - /api/v1/health - status, record counts, per-plant last update
//! - /api/v1/plants - registry with live plant summaries
//! - /api/v1/decisions/{approved,held} - last N decisions
//! - /api/v1/anomalies - last N anomaly reports
//! - /api/v1/forecasts - last N forecasts
//! - /api/v1/events - inject telemetry, faults and clears
//! - /api/v1/stream - live notifications (SSE)

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/plants", get(handlers::get_plants))
        .route("/plants/:plant_id", get(handlers::get_plant))
        .route("/decisions/approved", get(handlers::get_approved))
        .route("/decisions/held", get(handlers::get_held))
        .route("/anomalies", get(handlers::get_anomalies))
        .route("/forecasts", get(handlers::get_forecasts))
        .route("/events", post(handlers::post_event))
        .route("/stream", get(handlers::get_stream))
        .with_state(state)
}

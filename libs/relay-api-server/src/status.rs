use axum::Json;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use relay_api::iso_timestamp;
use relay_engine::{HealthStatus, LastMessage, MetricsSnapshot, MetricsView};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: HealthStatus,
    kafka_error: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LastMessageBody {
    last_message: Option<LastMessage>,
}

/// `GET /health`, `GET /metrics`, `GET /last-message` over a read-only view
/// of the consumer's metrics.
pub fn status_routes(metrics: MetricsView) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/last-message", get(handle_last_message))
        .with_state(metrics)
}

async fn handle_health(State(metrics): State<MetricsView>) -> Json<HealthBody> {
    let report = metrics.health();
    Json(HealthBody {
        status: report.status,
        kafka_error: report.error,
        timestamp: iso_timestamp(report.timestamp),
    })
}

async fn handle_metrics(State(metrics): State<MetricsView>) -> Json<MetricsSnapshot> {
    Json(metrics.metrics())
}

async fn handle_last_message(State(metrics): State<MetricsView>) -> Json<LastMessageBody> {
    Json(LastMessageBody {
        last_message: metrics.last_message(),
    })
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::http::response::error_response;
use crate::monitor::MetricsSnapshot;
use crate::security::reputation::BanRecord;

/// Default look-back for `/admin/metrics/history`: one hour.
pub const DEFAULT_HISTORY_MS: u64 = 60 * 60 * 1000;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub monitor_running: bool,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub duration_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct BanStatus {
    pub client: String,
    pub banned: bool,
    pub record: Option<BanRecord>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        monitor_running: state.collector.is_running().await,
    })
}

/// Last collected snapshot, or a fresh one if no cycle has run yet.
pub async fn get_latest_metrics(
    State(state): State<AdminState>,
) -> Result<Json<MetricsSnapshot>, axum::response::Response> {
    if let Some(snapshot) = state.collector.latest() {
        return Ok(Json(snapshot));
    }
    state.collector.snapshot().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Admin snapshot failed");
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Metrics unavailable")
    })
}

pub async fn get_metrics_history(
    State(state): State<AdminState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MetricsSnapshot>>, axum::response::Response> {
    let duration_ms = query.duration_ms.unwrap_or(DEFAULT_HISTORY_MS);
    state.collector.get_history(duration_ms).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, duration_ms, "Admin history read failed");
        error_response(StatusCode::SERVICE_UNAVAILABLE, "Metrics unavailable")
    })
}

pub async fn get_ban(
    State(state): State<AdminState>,
    Path(client): Path<String>,
) -> Result<Json<BanStatus>, axum::response::Response> {
    match state.gate.reputation().ban_record(&client).await {
        Ok(record) => Ok(Json(BanStatus {
            banned: record.is_some(),
            client,
            record,
        })),
        Err(e) => {
            tracing::error!(error = %e, client = %client, "Admin ban lookup failed");
            Err(error_response(StatusCode::SERVICE_UNAVAILABLE, "State store unavailable"))
        }
    }
}

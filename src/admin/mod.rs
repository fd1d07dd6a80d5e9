//! Admin API.
//!
//! Read-only views over the monitor and the ban records, behind a bearer key.
//! Served on its own listener so it never shares the gated router.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::monitor::MetricsCollector;
use crate::security::gate::RequestGate;

#[derive(Clone)]
pub struct AdminState {
    pub gate: Arc<RequestGate>,
    pub collector: MetricsCollector,
    pub api_key: Arc<String>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics/latest", get(get_latest_metrics))
        .route("/admin/metrics/history", get(get_metrics_history))
        .route("/admin/bans/{client}", get(get_ban))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

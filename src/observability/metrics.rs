//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_decisions_total` (counter): verdicts by outcome and reason
//! - `guard_bans_total` (counter): bans by reason
//! - `guard_store_errors_total` (counter): store failures by pipeline stage
//! - `guard_alerts_total` (counter): alerts by type
//! - `guard_*` gauges mirrored from every monitor snapshot

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::monitor::MetricsSnapshot;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(outcome: &'static str, reason: &'static str) {
    counter!("guard_decisions_total", "outcome" => outcome, "reason" => reason).increment(1);
}

pub fn record_ban(reason: &'static str) {
    counter!("guard_bans_total", "reason" => reason).increment(1);
}

pub fn record_store_error(stage: &'static str) {
    counter!("guard_store_errors_total", "stage" => stage).increment(1);
}

pub fn record_alert(kind: &'static str) {
    counter!("guard_alerts_total", "type" => kind).increment(1);
}

pub fn record_snapshot(snapshot: &MetricsSnapshot) {
    gauge!("guard_total_requests").set(snapshot.total_requests as f64);
    gauge!("guard_banned_clients").set(snapshot.banned_ips as f64);
    gauge!("guard_active_clients").set(snapshot.active_connections as f64);
    gauge!("guard_request_rate_per_minute").set(snapshot.request_rate as f64);
    gauge!("guard_suspicious_activities").set(snapshot.suspicious_activities as f64);
}

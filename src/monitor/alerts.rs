//! Threshold alerts over a metrics snapshot.

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::monitor::collector::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighTraffic,
    ManyBans,
    SuspiciousActivity,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighTraffic => "high_traffic",
            Self::ManyBans => "many_bans",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub message: String,
    pub severity: Severity,
    pub timestamp: u64,
}

/// Alert when a value is strictly above its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub request_rate: u64,
    pub banned_clients: u64,
    pub suspicious_activities: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            request_rate: 10_000,
            banned_clients: 1_000,
            suspicious_activities: 100,
        }
    }
}

impl From<&MonitorConfig> for AlertThresholds {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            request_rate: config.high_traffic_threshold,
            banned_clients: config.many_bans_threshold,
            suspicious_activities: config.suspicious_activity_threshold,
        }
    }
}

/// Evaluate each rule independently; a snapshot may raise several alerts.
pub fn analyze_for_alerts(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();

    if snapshot.request_rate > thresholds.request_rate {
        alerts.push(AlertEvent {
            kind: AlertType::HighTraffic,
            message: format!("High traffic detected: {} requests/minute", snapshot.request_rate),
            severity: Severity::Critical,
            timestamp: snapshot.timestamp,
        });
    }

    if snapshot.banned_ips > thresholds.banned_clients {
        alerts.push(AlertEvent {
            kind: AlertType::ManyBans,
            message: format!("High number of banned IPs: {}", snapshot.banned_ips),
            severity: Severity::Warning,
            timestamp: snapshot.timestamp,
        });
    }

    if snapshot.suspicious_activities > thresholds.suspicious_activities {
        alerts.push(AlertEvent {
            kind: AlertType::SuspiciousActivity,
            message: format!(
                "High number of suspicious activities: {}",
                snapshot.suspicious_activities
            ),
            severity: Severity::Warning,
            timestamp: snapshot.timestamp,
        });
    }

    alerts
}

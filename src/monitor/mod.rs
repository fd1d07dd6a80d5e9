//! Metrics collection and alerting.
//!
//! # Data Flow
//! ```text
//! Gate writes stats:* / recent_requests / active_clients / banned_clients
//!     → collector.rs (every interval_ms: snapshot)
//!         → subscribers (MonitorEvent::Metrics)
//!         → alerts.rs (threshold rules) → subscribers (MonitorEvent::Alert)
//!         → metrics_history series (pruned to history_retention_ms)
//! ```
//!
//! # Design Decisions
//! - Runs off the request path; a failed cycle is logged and skipped
//! - Per-subscriber unbounded channels, so a slow consumer never blocks a cycle

pub mod alerts;
pub mod collector;

pub use alerts::{analyze_for_alerts, AlertEvent, AlertThresholds, AlertType, Severity};
pub use collector::{CollectionError, MetricsCollector, MetricsSnapshot, MonitorEvent};

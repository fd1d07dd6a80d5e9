//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the store, gate and collector from a validated configuration
//! - Start background tasks (store janitor, metrics collector, event drain)
//!
//! # Design Decisions
//! - Fail fast: a bad detector pattern aborts startup
//! - Subsystems initialize in order, not concurrently
//! - Listeners are bound by the caller, after this returns

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;

use crate::clock::Clock;
use crate::config::{ConfigError, GuardConfig};
use crate::monitor::{MetricsCollector, MonitorEvent};
use crate::security::gate::RequestGate;
use crate::store::{MemoryStore, StateStore};

/// Everything the listeners need, built once.
pub struct GuardRuntime {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<dyn Clock>,
    pub gate: Arc<RequestGate>,
    pub collector: MetricsCollector,
}

impl GuardRuntime {
    pub fn build(config: &GuardConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn StateStore> = store.clone();

        let gate = Arc::new(RequestGate::from_config(config, shared.clone(), clock.clone())?);
        let collector = MetricsCollector::new(
            shared,
            clock.clone(),
            config.monitor.clone(),
            config.store.timeout_ms,
        );

        Ok(Self {
            store,
            clock,
            gate,
            collector,
        })
    }
}

/// Periodically drop expired keys from the store until shutdown.
pub fn spawn_janitor(
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.purge_expired(clock.now_ms()).await {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(removed, "Store janitor purged expired keys"),
                        Err(e) => tracing::error!(error = %e, "Store janitor failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Store janitor exiting");
                    break;
                }
            }
        }
    })
}

/// Log monitor events. Snapshots at debug, alerts were already logged by the collector.
pub fn spawn_event_drain(mut events: mpsc::UnboundedReceiver<MonitorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                MonitorEvent::Metrics(snapshot) => tracing::debug!(
                    total_requests = snapshot.total_requests,
                    banned = snapshot.banned_ips,
                    active = snapshot.active_connections,
                    rate = snapshot.request_rate,
                    suspicious = snapshot.suspicious_activities,
                    "Metrics snapshot"
                ),
                MonitorEvent::Alert(alert) => tracing::info!(
                    alert_type = alert.kind.as_str(),
                    timestamp = alert.timestamp,
                    "Alert delivered"
                ),
            }
        }
    })
}

//! Periodic metrics collection.
//!
//! # Responsibilities
//! - Snapshot the aggregate counters the gate writes
//! - Fan snapshots and alerts out to subscribers
//! - Keep a pruned, time-ordered history in the store
//!
//! The loop owns its task handle; `start` and `stop` are explicit. Timestamps
//! come from the injected [`Clock`], ticks from the tokio timer.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::monitor::alerts::{analyze_for_alerts, AlertEvent, AlertThresholds};
use crate::observability::metrics;
use crate::store::{keys, StateStore, StoreError};

/// Aggregate view of guard activity at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub banned_ips: u64,
    pub active_connections: u64,
    /// Requests seen in the last rate window (one minute by default).
    pub request_rate: u64,
    pub suspicious_activities: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Metrics(MetricsSnapshot),
    Alert(AlertEvent),
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("history entry could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

struct CollectorTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    thresholds: AlertThresholds,
    store_timeout_ms: u64,
    subscribers: DashMap<u64, mpsc::UnboundedSender<MonitorEvent>>,
    next_subscriber: AtomicU64,
    latest: watch::Sender<Option<MetricsSnapshot>>,
    task: Mutex<Option<CollectorTask>>,
}

/// Timer-driven snapshot and alert loop. Cheap to clone.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Inner>,
}

impl MetricsCollector {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
        store_timeout_ms: u64,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                thresholds: AlertThresholds::from(&config),
                config,
                store_timeout_ms,
                subscribers: DashMap::new(),
                next_subscriber: AtomicU64::new(0),
                latest,
                task: Mutex::new(None),
            }),
        }
    }

    /// Register an observer. Every event after this call is delivered until
    /// the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, tx);
        rx
    }

    /// Spawn the collection loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let collector = self.clone();
        let interval = Duration::from_millis(self.inner.config.interval_ms);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, "Metrics collector starting");
            let mut ticker = time::interval(interval);
            // The first tick fires immediately; the first snapshot is one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = collector.run_cycle().await {
                            tracing::error!(error = %e, "Metrics collection failed, skipping cycle");
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Metrics collector stopping");
                        break;
                    }
                }
            }
        });

        *task = Some(CollectorTask { stop: stop_tx, handle });
        true
    }

    /// Stop the loop and wait for it to exit. No-op when not running.
    pub async fn stop(&self) {
        let Some(task) = self.inner.task.lock().await.take() else {
            return;
        };
        let _ = task.stop.send(());
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Metrics collector task ended abnormally");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.task.lock().await.is_some()
    }

    /// Read the aggregate counters.
    pub async fn snapshot(&self) -> Result<MetricsSnapshot, CollectionError> {
        let store = &self.inner.store;
        let now = self.inner.clock.now_ms();
        let (total_requests, banned_ips, active_connections, request_rate, suspicious_activities) = self
            .bounded(async {
                tokio::try_join!(
                    store.counter(keys::TOTAL_REQUESTS),
                    store.set_card(keys::BANNED_CLIENTS, now),
                    store.set_card(keys::ACTIVE_CLIENTS, now),
                    store.window_count(keys::RECENT_REQUESTS, now, self.inner.config.request_rate_window_ms),
                    store.counter(keys::SUSPICIOUS_ACTIVITIES),
                )
            })
            .await?;

        Ok(MetricsSnapshot {
            total_requests,
            banned_ips,
            active_connections,
            request_rate,
            suspicious_activities,
            timestamp: now,
        })
    }

    /// One collection cycle: snapshot, publish, alert, persist, prune.
    pub async fn run_cycle(&self) -> Result<MetricsSnapshot, CollectionError> {
        let snapshot = self.snapshot().await?;

        metrics::record_snapshot(&snapshot);
        self.inner.latest.send_replace(Some(snapshot.clone()));
        self.publish(MonitorEvent::Metrics(snapshot.clone()));

        for alert in self.analyze_for_alerts(&snapshot) {
            metrics::record_alert(alert.kind.as_str());
            tracing::warn!(
                alert_type = alert.kind.as_str(),
                severity = ?alert.severity,
                message = %alert.message,
                "Monitor alert"
            );
            self.publish(MonitorEvent::Alert(alert));
        }

        self.store_history(&snapshot).await?;
        Ok(snapshot)
    }

    pub fn analyze_for_alerts(&self, snapshot: &MetricsSnapshot) -> Vec<AlertEvent> {
        analyze_for_alerts(snapshot, &self.inner.thresholds)
    }

    /// Snapshots recorded within `[now - duration_ms, now]`, oldest first.
    pub async fn get_history(&self, duration_ms: u64) -> Result<Vec<MetricsSnapshot>, CollectionError> {
        let now = self.inner.clock.now_ms();
        let raw = self
            .bounded(
                self.inner
                    .store
                    .series_range(keys::METRICS_HISTORY, now.saturating_sub(duration_ms), now),
            )
            .await?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(CollectionError::from))
            .collect()
    }

    /// Most recent snapshot, if a cycle has completed.
    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.inner.latest.borrow().clone()
    }

    async fn store_history(&self, snapshot: &MetricsSnapshot) -> Result<(), CollectionError> {
        let encoded = serde_json::to_string(snapshot)?;
        let store = &self.inner.store;
        let cutoff = snapshot
            .timestamp
            .saturating_sub(self.inner.config.history_retention_ms);

        self.bounded(store.series_append(keys::METRICS_HISTORY, snapshot.timestamp, encoded))
            .await?;
        let pruned = self.bounded(store.series_prune(keys::METRICS_HISTORY, cutoff)).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned metrics history");
        }
        Ok(())
    }

    fn publish(&self, event: MonitorEvent) {
        self.inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let limit_ms = self.inner.store_timeout_ms;
        match time::timeout(Duration::from_millis(limit_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::monitor::alerts::AlertType;
    use crate::store::faulty::FaultyStore;
    use crate::store::MemoryStore;

    fn collector(config: MonitorConfig) -> (MetricsCollector, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(100_000_000));
        let collector = MetricsCollector::new(store.clone(), clock.clone(), config, 1_000);
        (collector, store, clock)
    }

    async fn requests(store: &MemoryStore, now: u64, n: u64) {
        for _ in 0..n {
            store.incr(keys::TOTAL_REQUESTS).await.unwrap();
            store.window_record(keys::RECENT_REQUESTS, now, 60_000).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_snapshot_reads_aggregates() {
        let (collector, store, clock) = collector(MonitorConfig::default());
        let now = clock.now_ms();
        requests(&store, now - 120_000, 3).await;
        requests(&store, now, 2).await;
        store.set_add(keys::BANNED_CLIENTS, "a", now, 1_000).await.unwrap();
        store.set_add(keys::ACTIVE_CLIENTS, "a", now, 1_000).await.unwrap();
        store.set_add(keys::ACTIVE_CLIENTS, "b", now, 1_000).await.unwrap();
        store.incr(keys::SUSPICIOUS_ACTIVITIES).await.unwrap();

        let snapshot = collector.snapshot().await.unwrap();
        assert_eq!(
            snapshot,
            MetricsSnapshot {
                total_requests: 5,
                banned_ips: 1,
                active_connections: 2,
                request_rate: 2,
                suspicious_activities: 1,
                timestamp: now,
            }
        );
    }

    #[tokio::test]
    async fn test_high_traffic_boundary() {
        let (collector, store, clock) = collector(MonitorConfig::default());
        let mut events = collector.subscribe();

        requests(&store, clock.now_ms(), 10_000).await;
        collector.run_cycle().await.unwrap();
        assert!(matches!(events.recv().await, Some(MonitorEvent::Metrics(_))));
        assert!(events.try_recv().is_err());

        requests(&store, clock.now_ms(), 1).await;
        collector.run_cycle().await.unwrap();
        assert!(matches!(events.recv().await, Some(MonitorEvent::Metrics(_))));
        match events.recv().await {
            Some(MonitorEvent::Alert(alert)) => assert_eq!(alert.kind, AlertType::HighTraffic),
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_window_and_retention() {
        let config = MonitorConfig {
            history_retention_ms: 10_000,
            ..Default::default()
        };
        let (collector, _store, clock) = collector(config);

        for _ in 0..5 {
            collector.run_cycle().await.unwrap();
            clock.advance(5_000);
        }
        // Cycles at t0, +5s, +10s, +15s, +20s; now is +25s.
        // The last prune ran at +20s and dropped everything at or before +10s.
        let history = collector.get_history(60_000).await.unwrap();
        assert_eq!(history.len(), 2);

        let recent = collector.get_history(5_000).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, clock.now_ms() - 5_000);
        assert_eq!(collector.latest(), Some(recent[0].clone()));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_forgotten() {
        let (collector, _store, _clock) = collector(MonitorConfig::default());
        let dropped = collector.subscribe();
        let mut kept = collector.subscribe();
        drop(dropped);

        collector.run_cycle().await.unwrap();
        assert_eq!(collector.inner.subscribers.len(), 1);
        assert!(kept.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let config = MonitorConfig {
            interval_ms: 20,
            ..Default::default()
        };
        let (collector, _store, _clock) = collector(config);
        let mut events = collector.subscribe();

        assert!(collector.start().await);
        assert!(!collector.start().await);

        let event = time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(event, Some(MonitorEvent::Metrics(_))));

        collector.stop().await;
        assert!(!collector.is_running().await);
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_failed_cycles_do_not_stop_the_loop() {
        let store = Arc::new(FaultyStore::down());
        let clock = Arc::new(ManualClock::new(100_000_000));
        let config = MonitorConfig {
            interval_ms: 20,
            ..Default::default()
        };
        let collector = MetricsCollector::new(store.clone(), clock, config, 1_000);
        let mut events = collector.subscribe();

        assert!(collector.start().await);
        // Several ticks against a dead store publish nothing.
        time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
        assert!(collector.is_running().await);

        store.set_down(false);
        let event = time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(event, Some(MonitorEvent::Metrics(_))));

        collector.stop().await;
    }
}

//! Behavioral anomaly detection.
//!
//! Three independent heuristics, OR-combined:
//! - repetition: same path or same method hammered inside the history window
//! - speed: too many requests inside the one-second burst window
//! - concurrency: too many requests inside the current one-second bucket
//!
//! All three are recorded on every call, even when an earlier one already
//! tripped, so the windows stay accurate for the next request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::BehaviorConfig;
use crate::security::descriptor::RequestDescriptor;
use crate::store::{keys, StateStore, StoreResult};

/// What gets kept in the per-client history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    path: String,
    method: String,
    timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    SamePath,
    SameMethod,
    Speed,
    Concurrency,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SamePath => "same_path",
            Self::SameMethod => "same_method",
            Self::Speed => "speed",
            Self::Concurrency => "concurrency",
        }
    }
}

/// A tripped heuristic: `observed` exceeded `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub observed: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BehaviorReport {
    pub suspicious: bool,
    pub signals: Vec<Signal>,
}

impl BehaviorReport {
    fn from_signals(signals: Vec<Signal>) -> Self {
        Self {
            suspicious: !signals.is_empty(),
            signals,
        }
    }

    pub fn has(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }
}

pub struct BehaviorAnalyzer {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: BehaviorConfig,
    speed_limit: u64,
}

impl BehaviorAnalyzer {
    /// `request_budget` is the rate limiter's per-window budget; the speed
    /// heuristic allows `speed_budget_ratio` of it per burst window.
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        config: BehaviorConfig,
        request_budget: u64,
    ) -> Self {
        // Counts are whole numbers, so `count > budget * ratio` is `count > floor(budget * ratio)`.
        let speed_limit = (request_budget as f64 * config.speed_budget_ratio + 1e-9).floor() as u64;
        Self {
            store,
            clock,
            config,
            speed_limit,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn analyze(&self, client_key: &str, request: &RequestDescriptor) -> StoreResult<BehaviorReport> {
        if !self.config.enabled {
            return Ok(BehaviorReport::default());
        }

        let now = self.clock.now_ms();
        let (repetition, speed, concurrency) = tokio::try_join!(
            self.repetition(client_key, request, now),
            self.speed(client_key, now),
            self.concurrency(client_key, now),
        )?;

        let signals: Vec<Signal> = repetition
            .into_iter()
            .chain(speed)
            .chain(concurrency)
            .collect();

        if !signals.is_empty() {
            tracing::debug!(client = %client_key, ?signals, "Behavior signals tripped");
        }
        Ok(BehaviorReport::from_signals(signals))
    }

    async fn repetition(&self, client_key: &str, request: &RequestDescriptor, now: u64) -> StoreResult<Vec<Signal>> {
        let entry = HistoryEntry {
            path: request.path.clone(),
            method: request.method.clone(),
            timestamp: now,
        };
        let encoded = serde_json::to_string(&entry).unwrap_or_default();
        let history = self
            .store
            .log_append(&keys::behavior(client_key), now, self.config.history_window_ms, encoded)
            .await?;

        let mut same_path = 0u64;
        let mut same_method = 0u64;
        for raw in &history {
            let Ok(past) = serde_json::from_str::<HistoryEntry>(raw) else {
                continue;
            };
            if past.path == request.path {
                same_path += 1;
            }
            if past.method == request.method {
                same_method += 1;
            }
        }

        let mut signals = Vec::new();
        if same_path > self.config.same_path_threshold {
            signals.push(Signal {
                kind: SignalKind::SamePath,
                observed: same_path,
                limit: self.config.same_path_threshold,
            });
        }
        if same_method > self.config.same_method_threshold {
            signals.push(Signal {
                kind: SignalKind::SameMethod,
                observed: same_method,
                limit: self.config.same_method_threshold,
            });
        }
        Ok(signals)
    }

    async fn speed(&self, client_key: &str, now: u64) -> StoreResult<Option<Signal>> {
        let count = self
            .store
            .window_record(&keys::speed(client_key), now, self.config.speed_window_ms)
            .await?;
        Ok((count > self.speed_limit).then_some(Signal {
            kind: SignalKind::Speed,
            observed: count,
            limit: self.speed_limit,
        }))
    }

    async fn concurrency(&self, client_key: &str, now: u64) -> StoreResult<Option<Signal>> {
        let in_flight = self
            .store
            .incr_with_ttl(&keys::concurrent(client_key), now, self.config.concurrency_ttl_ms)
            .await?;
        Ok((in_flight > self.config.concurrency_threshold).then_some(Signal {
            kind: SignalKind::Concurrency,
            observed: in_flight,
            limit: self.config.concurrency_threshold,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn analyzer(config: BehaviorConfig, budget: u64) -> (BehaviorAnalyzer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let analyzer = BehaviorAnalyzer::new(Arc::new(MemoryStore::new()), clock.clone(), config, budget);
        (analyzer, clock)
    }

    fn get(path: &str) -> RequestDescriptor {
        RequestDescriptor::new("c", "GET", path)
    }

    #[tokio::test]
    async fn test_same_path_trips_above_fifty() {
        let (analyzer, clock) = analyzer(BehaviorConfig::default(), 1000);

        // 100ms apart keeps speed and concurrency quiet.
        for _ in 0..50 {
            let report = analyzer.analyze("c", &get("/login")).await.unwrap();
            assert!(!report.suspicious, "{:?}", report);
            clock.advance(100);
        }
        let report = analyzer.analyze("c", &get("/login")).await.unwrap();
        assert!(report.suspicious);
        assert!(report.has(SignalKind::SamePath));
        assert!(!report.has(SignalKind::SameMethod));
    }

    #[tokio::test]
    async fn test_history_expires_after_window() {
        let (analyzer, clock) = analyzer(BehaviorConfig::default(), 1000);
        for _ in 0..50 {
            analyzer.analyze("c", &get("/a")).await.unwrap();
            clock.advance(100);
        }
        clock.advance(5 * 60 * 1000);
        let report = analyzer.analyze("c", &get("/a")).await.unwrap();
        assert!(!report.suspicious);
    }

    #[tokio::test]
    async fn test_same_method_across_paths() {
        let config = BehaviorConfig {
            same_method_threshold: 5,
            ..Default::default()
        };
        let (analyzer, clock) = analyzer(config, 1000);
        for i in 0..5 {
            let report = analyzer.analyze("c", &get(&format!("/item/{}", i))).await.unwrap();
            assert!(!report.suspicious);
            clock.advance(200);
        }
        let report = analyzer.analyze("c", &get("/item/99")).await.unwrap();
        assert_eq!(
            report.signals,
            vec![Signal {
                kind: SignalKind::SameMethod,
                observed: 6,
                limit: 5
            }]
        );
    }

    #[tokio::test]
    async fn test_speed_is_ten_percent_of_budget() {
        let config = BehaviorConfig {
            concurrency_threshold: 1_000,
            ..Default::default()
        };
        let (analyzer, clock) = analyzer(config, 50);
        // Budget 50 → more than 5 per second is a burst.
        for i in 0..5 {
            let report = analyzer.analyze("c", &get(&format!("/{}", i))).await.unwrap();
            assert!(!report.has(SignalKind::Speed));
            clock.advance(10);
        }
        let report = analyzer.analyze("c", &get("/x")).await.unwrap();
        assert!(report.has(SignalKind::Speed));

        clock.advance(1_000);
        let report = analyzer.analyze("c", &get("/y")).await.unwrap();
        assert!(!report.has(SignalKind::Speed));
    }

    #[tokio::test]
    async fn test_concurrency_trips_above_twenty() {
        let (analyzer, _clock) = analyzer(BehaviorConfig::default(), 100_000);
        for i in 0..20 {
            let report = analyzer.analyze("c", &get(&format!("/{}", i))).await.unwrap();
            assert!(!report.has(SignalKind::Concurrency));
        }
        let report = analyzer.analyze("c", &get("/last")).await.unwrap();
        assert!(report.has(SignalKind::Concurrency));
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let config = BehaviorConfig {
            enabled: false,
            ..Default::default()
        };
        let (analyzer, _clock) = analyzer(config, 1);
        for _ in 0..100 {
            assert!(!analyzer.analyze("c", &get("/")).await.unwrap().suspicious);
        }
    }
}

//! In-process state store backed by `DashMap`.
//!
//! Atomicity comes from the map's per-key entry guard: every trait method
//! performs its whole read-modify-write while holding the entry for its key,
//! so two workers racing on the same client serialize on that shard.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{StateStore, StoreResult};

/// Timestamps kept in ascending order, so expiry only ever pops the front.
#[derive(Debug, Default)]
struct WindowLog {
    stamps: VecDeque<u64>,
    window_ms: u64,
}

impl WindowLog {
    fn purge(&mut self, now: u64, window_ms: u64) {
        self.window_ms = window_ms;
        if let Some(cutoff) = now.checked_sub(window_ms) {
            while self.stamps.front().is_some_and(|&t| t <= cutoff) {
                self.stamps.pop_front();
            }
        }
    }

    /// Callers read the clock before taking the entry, so a racing worker can
    /// arrive slightly late; it is placed from the back.
    fn push(&mut self, now: u64) {
        let at = self
            .stamps
            .iter()
            .rposition(|&t| t <= now)
            .map_or(0, |i| i + 1);
        self.stamps.insert(at, now);
    }

    fn is_stale(&self, now: u64) -> bool {
        match (now.checked_sub(self.window_ms), self.stamps.back()) {
            (_, None) => true,
            (Some(cutoff), Some(&newest)) => newest <= cutoff,
            (None, Some(_)) => false,
        }
    }
}

#[derive(Debug, Default)]
struct TimedLog {
    entries: VecDeque<(u64, String)>,
    window_ms: u64,
}

impl TimedLog {
    fn purge(&mut self, now: u64) {
        if let Some(cutoff) = now.checked_sub(self.window_ms) {
            while self.entries.front().is_some_and(|(t, _)| *t <= cutoff) {
                self.entries.pop_front();
            }
        }
    }

    fn push(&mut self, now: u64, entry: String) {
        let at = self
            .entries
            .iter()
            .rposition(|(t, _)| *t <= now)
            .map_or(0, |i| i + 1);
        self.entries.insert(at, (now, entry));
    }
}

#[derive(Debug, Clone, Copy)]
struct ExpiringCounter {
    value: u64,
    expires_at: u64,
}

#[derive(Debug, Clone)]
struct Marker {
    value: String,
    expires_at: u64,
}

/// Thread-safe in-memory [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<String, WindowLog>,
    logs: DashMap<String, TimedLog>,
    expiring_counters: DashMap<String, ExpiringCounter>,
    counters: DashMap<String, u64>,
    markers: DashMap<String, Marker>,
    sets: DashMap<String, HashMap<String, u64>>,
    series: DashMap<String, BTreeMap<u64, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, across all structures.
    pub fn key_count(&self) -> usize {
        self.windows.len()
            + self.logs.len()
            + self.expiring_counters.len()
            + self.counters.len()
            + self.markers.len()
            + self.sets.len()
            + self.series.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn window_admit(&self, key: &str, now: u64, window_ms: u64, limit: u64) -> StoreResult<bool> {
        let mut log = self.windows.entry(key.to_string()).or_default();
        log.purge(now, window_ms);
        if log.stamps.len() as u64 >= limit {
            return Ok(false);
        }
        log.push(now);
        Ok(true)
    }

    async fn window_record(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64> {
        let mut log = self.windows.entry(key.to_string()).or_default();
        log.purge(now, window_ms);
        log.push(now);
        Ok(log.stamps.len() as u64)
    }

    async fn window_count(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64> {
        match self.windows.get_mut(key) {
            Some(mut log) => {
                log.purge(now, window_ms);
                Ok(log.stamps.len() as u64)
            }
            None => Ok(0),
        }
    }

    async fn log_append(&self, key: &str, now: u64, window_ms: u64, entry: String) -> StoreResult<Vec<String>> {
        let mut log = self.logs.entry(key.to_string()).or_default();
        log.window_ms = window_ms;
        log.push(now, entry);
        log.purge(now);
        Ok(log.entries.iter().map(|(_, e)| e.clone()).collect())
    }

    async fn incr_with_ttl(&self, key: &str, now: u64, ttl_ms: u64) -> StoreResult<u64> {
        let mut counter = self
            .expiring_counters
            .entry(key.to_string())
            .or_insert(ExpiringCounter {
                value: 0,
                expires_at: now + ttl_ms,
            });
        if now >= counter.expires_at {
            *counter = ExpiringCounter {
                value: 0,
                expires_at: now + ttl_ms,
            };
        }
        counter.value += 1;
        Ok(counter.value)
    }

    async fn incr(&self, key: &str) -> StoreResult<u64> {
        let mut value = self.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn counter(&self, key: &str) -> StoreResult<u64> {
        Ok(self.counters.get(key).map(|v| *v).unwrap_or(0))
    }

    async fn put_marker(&self, key: &str, value: String, now: u64, ttl_ms: u64) -> StoreResult<()> {
        self.markers.insert(
            key.to_string(),
            Marker {
                value,
                expires_at: now + ttl_ms,
            },
        );
        Ok(())
    }

    async fn marker(&self, key: &str, now: u64) -> StoreResult<Option<String>> {
        Ok(self
            .markers
            .get(key)
            .filter(|m| now < m.expires_at)
            .map(|m| m.value.clone()))
    }

    async fn set_add(&self, set: &str, member: &str, now: u64, ttl_ms: u64) -> StoreResult<()> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), now + ttl_ms);
        Ok(())
    }

    async fn set_card(&self, set: &str, now: u64) -> StoreResult<u64> {
        Ok(self
            .sets
            .get(set)
            .map(|members| members.values().filter(|&&expires_at| now < expires_at).count() as u64)
            .unwrap_or(0))
    }

    async fn series_append(&self, key: &str, score: u64, member: String) -> StoreResult<()> {
        self.series
            .entry(key.to_string())
            .or_default()
            .entry(score)
            .or_default()
            .push(member);
        Ok(())
    }

    async fn series_range(&self, key: &str, min: u64, max: u64) -> StoreResult<Vec<String>> {
        if min > max {
            return Ok(Vec::new());
        }
        Ok(self
            .series
            .get(key)
            .map(|series| {
                series
                    .range(min..=max)
                    .flat_map(|(_, members)| members.iter().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn series_prune(&self, key: &str, max_score: u64) -> StoreResult<u64> {
        let Some(mut series) = self.series.get_mut(key) else {
            return Ok(0);
        };
        let kept = series.split_off(&(max_score + 1));
        let removed = series.values().map(|m| m.len() as u64).sum();
        *series = kept;
        Ok(removed)
    }

    async fn purge_expired(&self, now: u64) -> StoreResult<usize> {
        let before = self.key_count();

        self.windows.retain(|_, log| !log.is_stale(now));
        self.logs.retain(|_, log| {
            log.purge(now);
            !log.entries.is_empty()
        });
        self.expiring_counters.retain(|_, c| now < c.expires_at);
        self.markers.retain(|_, m| now < m.expires_at);
        self.sets.retain(|_, members| {
            members.retain(|_, expires_at| now < *expires_at);
            !members.is_empty()
        });

        Ok(before.saturating_sub(self.key_count()))
    }
}

//! Test double: a [`MemoryStore`] that can be slowed down or made to fail.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{MemoryStore, StateStore, StoreError, StoreResult};

#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    down: AtomicBool,
    failing: Mutex<HashSet<&'static str>>,
    delay: Option<Duration>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails until [`FaultyStore::set_down`] clears it.
    pub fn down() -> Self {
        let store = Self::default();
        store.set_down(true);
        store
    }

    /// Every call sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail only the named operation, e.g. `"set_add"`.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    async fn enter(&self, op: &'static str) -> StoreResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(op) {
            return Err(StoreError::Unavailable(format!("{} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn window_admit(&self, key: &str, now: u64, window_ms: u64, limit: u64) -> StoreResult<bool> {
        self.enter("window_admit").await?;
        self.inner.window_admit(key, now, window_ms, limit).await
    }

    async fn window_record(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64> {
        self.enter("window_record").await?;
        self.inner.window_record(key, now, window_ms).await
    }

    async fn window_count(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64> {
        self.enter("window_count").await?;
        self.inner.window_count(key, now, window_ms).await
    }

    async fn log_append(&self, key: &str, now: u64, window_ms: u64, entry: String) -> StoreResult<Vec<String>> {
        self.enter("log_append").await?;
        self.inner.log_append(key, now, window_ms, entry).await
    }

    async fn incr_with_ttl(&self, key: &str, now: u64, ttl_ms: u64) -> StoreResult<u64> {
        self.enter("incr_with_ttl").await?;
        self.inner.incr_with_ttl(key, now, ttl_ms).await
    }

    async fn incr(&self, key: &str) -> StoreResult<u64> {
        self.enter("incr").await?;
        self.inner.incr(key).await
    }

    async fn counter(&self, key: &str) -> StoreResult<u64> {
        self.enter("counter").await?;
        self.inner.counter(key).await
    }

    async fn put_marker(&self, key: &str, value: String, now: u64, ttl_ms: u64) -> StoreResult<()> {
        self.enter("put_marker").await?;
        self.inner.put_marker(key, value, now, ttl_ms).await
    }

    async fn marker(&self, key: &str, now: u64) -> StoreResult<Option<String>> {
        self.enter("marker").await?;
        self.inner.marker(key, now).await
    }

    async fn set_add(&self, set: &str, member: &str, now: u64, ttl_ms: u64) -> StoreResult<()> {
        self.enter("set_add").await?;
        self.inner.set_add(set, member, now, ttl_ms).await
    }

    async fn set_card(&self, set: &str, now: u64) -> StoreResult<u64> {
        self.enter("set_card").await?;
        self.inner.set_card(set, now).await
    }

    async fn series_append(&self, key: &str, score: u64, member: String) -> StoreResult<()> {
        self.enter("series_append").await?;
        self.inner.series_append(key, score, member).await
    }

    async fn series_range(&self, key: &str, min: u64, max: u64) -> StoreResult<Vec<String>> {
        self.enter("series_range").await?;
        self.inner.series_range(key, min, max).await
    }

    async fn series_prune(&self, key: &str, max_score: u64) -> StoreResult<u64> {
        self.enter("series_prune").await?;
        self.inner.series_prune(key, max_score).await
    }

    async fn purge_expired(&self, now: u64) -> StoreResult<usize> {
        self.enter("purge_expired").await?;
        self.inner.purge_expired(now).await
    }
}

//! Shared state store.
//!
//! # Data Flow
//! ```text
//! RequestGate / RateLimiter / ReputationStore / BehaviorAnalyzer
//!     → StateStore (atomic per-key primitives)
//!     ← MetricsCollector (aggregate reads, history series)
//! ```
//!
//! # Design Decisions
//! - Each trait method is one atomic operation against the store; callers never
//!   compose a read and a write across two calls for the same key
//! - Time is passed in by the caller, the store never reads a clock
//! - Expired keys behave as absent even before the janitor removes them
//!
//! # Key layout
//! - `ratelimit:<client>`   sliding-window timestamp log
//! - `banned:<client>`      TTL marker holding the ban record
//! - `behavior:<client>`    timestamp-ordered descriptor log
//! - `speed:<client>`       one-second timestamp log
//! - `concurrent:<client>`  one-second counter
//! - `metrics_history`      score-ordered snapshot series
//! - `stats:*`              global counters

pub mod memory;

#[cfg(test)]
pub(crate) mod faulty;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

/// Failure talking to the shared store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("state store call timed out after {0}ms")]
    Timeout(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic primitives the guard pipeline needs from its backing store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Purge entries at or before `now - window_ms`, count the rest and record
    /// `now` only if the count is below `limit`. Returns whether `now` was recorded.
    async fn window_admit(&self, key: &str, now: u64, window_ms: u64, limit: u64) -> StoreResult<bool>;

    /// Purge, record `now` unconditionally, and return the in-window count.
    async fn window_record(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64>;

    /// Purge and count without recording.
    async fn window_count(&self, key: &str, now: u64, window_ms: u64) -> StoreResult<u64>;

    /// Append `entry` at `now`, purge entries at or before `now - window_ms`,
    /// and return every retained entry oldest first.
    async fn log_append(&self, key: &str, now: u64, window_ms: u64, entry: String) -> StoreResult<Vec<String>>;

    /// Increment a counter that expires `ttl_ms` after it was created.
    async fn incr_with_ttl(&self, key: &str, now: u64, ttl_ms: u64) -> StoreResult<u64>;

    /// Increment a non-expiring counter.
    async fn incr(&self, key: &str) -> StoreResult<u64>;

    /// Read a non-expiring counter (0 when absent).
    async fn counter(&self, key: &str) -> StoreResult<u64>;

    /// Set a marker, replacing any previous value and expiry.
    async fn put_marker(&self, key: &str, value: String, now: u64, ttl_ms: u64) -> StoreResult<()>;

    /// Read a live marker.
    async fn marker(&self, key: &str, now: u64) -> StoreResult<Option<String>>;

    /// Add or refresh a set member that expires after `ttl_ms`.
    async fn set_add(&self, set: &str, member: &str, now: u64, ttl_ms: u64) -> StoreResult<()>;

    /// Number of live members of a set.
    async fn set_card(&self, set: &str, now: u64) -> StoreResult<u64>;

    /// Append a member to a score-ordered series.
    async fn series_append(&self, key: &str, score: u64, member: String) -> StoreResult<()>;

    /// Members with `min <= score <= max`, in score order.
    async fn series_range(&self, key: &str, min: u64, max: u64) -> StoreResult<Vec<String>>;

    /// Drop members with `score <= max_score`. Returns how many were dropped.
    async fn series_prune(&self, key: &str, max_score: u64) -> StoreResult<u64>;

    /// Remove everything that has expired as of `now`.
    async fn purge_expired(&self, now: u64) -> StoreResult<usize>;
}

/// Key helpers for the logical layout.
pub mod keys {
    pub const TOTAL_REQUESTS: &str = "stats:total_requests";
    pub const TOTAL_BANS: &str = "stats:total_bans";
    pub const SUSPICIOUS_ACTIVITIES: &str = "stats:suspicious_activities";
    pub const BANNED_CLIENTS: &str = "banned_clients";
    pub const ACTIVE_CLIENTS: &str = "active_clients";
    pub const RECENT_REQUESTS: &str = "recent_requests";
    pub const METRICS_HISTORY: &str = "metrics_history";

    pub fn rate_limit(client: &str) -> String {
        format!("ratelimit:{}", client)
    }

    pub fn banned(client: &str) -> String {
        format!("banned:{}", client)
    }

    pub fn behavior(client: &str) -> String {
        format!("behavior:{}", client)
    }

    pub fn speed(client: &str) -> String {
        format!("speed:{}", client)
    }

    pub fn concurrent(client: &str) -> String {
        format!("concurrent:{}", client)
    }
}

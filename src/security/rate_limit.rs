//! Sliding-window rate limiting.
//!
//! Each client owns a log of request timestamps under `ratelimit:<client>`.
//! Admission purges entries at or before `now - window`, counts the rest and
//! records `now` only when there is room. The three steps are a single
//! [`StateStore::window_admit`] call so that concurrent requests from one
//! client cannot both observe the last free slot.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::store::{keys, StateStore, StoreResult};

/// Per-client sliding-window admission counter.
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self { store, clock, config }
    }

    /// Admit against the configured window and budget.
    pub async fn check(&self, client_key: &str) -> StoreResult<bool> {
        self.admit(client_key, self.config.window_ms, self.config.max_requests_per_ip)
            .await
    }

    /// Admit against an explicit window and budget.
    pub async fn admit(&self, client_key: &str, window_ms: u64, max_requests: u64) -> StoreResult<bool> {
        let now = self.clock.now_ms();
        let admitted = self
            .store
            .window_admit(&keys::rate_limit(client_key), now, window_ms, max_requests)
            .await?;

        if !admitted {
            tracing::debug!(client = %client_key, window_ms, max_requests, "Rate window exhausted");
        }
        Ok(admitted)
    }

    /// Requests currently counted against the client.
    pub async fn in_window(&self, client_key: &str) -> StoreResult<u64> {
        self.store
            .window_count(&keys::rate_limit(client_key), self.clock.now_ms(), self.config.window_ms)
            .await
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

//! Client reputation: static allow/deny lists and TTL-bound bans.
//!
//! # Design Decisions
//! - Lists are static configuration and never touch the store
//! - A ban is a `banned:<client>` marker holding the serialized [`BanRecord`]
//! - Banning again replaces the marker, so the ban restarts at full length
//!   instead of adding to the time that was left
//! - Banned clients are also tracked in a member-expiring set so the monitor
//!   can report how many are currently banned

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{BanConfig, IpFilterConfig};
use crate::observability::metrics;
use crate::store::{keys, StateStore, StoreResult};

/// Why and until when a client is banned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub reason: String,
    pub banned_at: u64,
    pub expires_at: u64,
}

pub struct ReputationStore {
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: BanConfig,
}

impl ReputationStore {
    pub fn new(
        filter: &IpFilterConfig,
        config: BanConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            whitelist: filter.whitelist.iter().cloned().collect(),
            blacklist: filter.blacklist.iter().cloned().collect(),
            store,
            clock,
            config,
        }
    }

    pub fn is_whitelisted(&self, client_key: &str) -> bool {
        self.whitelist.contains(client_key)
    }

    pub fn is_blacklisted(&self, client_key: &str) -> bool {
        self.blacklist.contains(client_key)
    }

    pub async fn is_banned(&self, client_key: &str) -> StoreResult<bool> {
        Ok(self.ban_record(client_key).await?.is_some())
    }

    /// The live ban record, if any.
    pub async fn ban_record(&self, client_key: &str) -> StoreResult<Option<BanRecord>> {
        let now = self.clock.now_ms();
        let raw = self.store.marker(&keys::banned(client_key), now).await?;
        Ok(raw.map(|raw| {
            serde_json::from_str(&raw).unwrap_or_else(|_| BanRecord {
                reason: raw,
                banned_at: now,
                expires_at: now,
            })
        }))
    }

    /// Ban for the configured duration.
    pub async fn ban_default(&self, client_key: &str, reason: &'static str) -> StoreResult<()> {
        self.ban(client_key, self.config.ban_time_ms, reason).await
    }

    /// Ban `client_key` for `duration_ms` from now, replacing any earlier ban.
    ///
    /// Only the marker write decides success. The banned-client set and the
    /// ban counter are bookkeeping for the monitor: their failures are logged
    /// and the ban stands.
    pub async fn ban(&self, client_key: &str, duration_ms: u64, reason: &'static str) -> StoreResult<()> {
        let now = self.clock.now_ms();
        let record = BanRecord {
            reason: reason.to_string(),
            banned_at: now,
            expires_at: now + duration_ms,
        };
        let value = serde_json::to_string(&record).unwrap_or_else(|_| reason.to_string());

        self.store
            .put_marker(&keys::banned(client_key), value, now, duration_ms)
            .await?;
        let (tracked, counted) = tokio::join!(
            self.store.set_add(keys::BANNED_CLIENTS, client_key, now, duration_ms),
            self.store.incr(keys::TOTAL_BANS),
        );
        if let Err(e) = tracked {
            tracing::error!(client = %client_key, error = %e, "Ban not added to banned-client set");
        }
        if let Err(e) = counted {
            tracing::error!(client = %client_key, error = %e, "Ban not counted");
        }

        metrics::record_ban(reason);
        tracing::warn!(
            client = %client_key,
            reason,
            duration_ms,
            expires_at = record.expires_at,
            "Client banned"
        );
        Ok(())
    }

    pub fn ban_time_ms(&self) -> u64 {
        self.config.ban_time_ms
    }
}

//! The admit/reject pipeline.
//!
//! # Check order (short-circuiting)
//! ```text
//! record traffic (observational)
//!     → blacklist        403
//!     → whitelist        allow, nothing else runs
//!     → ban              403
//!     → rate limit       ban + 429
//!     → behavior         ban + 403
//!     → payload          403, no ban
//!     → sanitize         allow
//! ```
//!
//! # Design Decisions
//! - Every store call is bounded by `store.timeout_ms`
//! - A failed check follows `store.failure_policy`: fail open skips the
//!   check, fail closed rejects with 500
//! - Writes that only feed the monitor never change a verdict
//! - Rejection bodies stay generic; detail goes to the log

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::{ConfigError, FailurePolicy, GuardConfig, SanitizationConfig, StoreConfig};
use crate::observability::metrics;
use crate::security::behavior::BehaviorAnalyzer;
use crate::security::descriptor::RequestDescriptor;
use crate::security::payload::PayloadInspector;
use crate::security::rate_limit::RateLimiter;
use crate::security::reputation::ReputationStore;
use crate::security::sanitize::sanitize_payload;
use crate::store::{keys, StateStore, StoreError, StoreResult};

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Blacklisted,
    Banned,
    RateLimited,
    SuspiciousBehavior,
    MaliciousPayload,
    StoreUnavailable,
}

impl RejectReason {
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimited => 429,
            Self::StoreUnavailable => 500,
            Self::Blacklisted | Self::Banned | Self::SuspiciousBehavior | Self::MaliciousPayload => 403,
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Blacklisted => "Access denied",
            Self::Banned => "Your IP has been blocked due to suspicious activity",
            Self::RateLimited => "Too many requests, please try again later",
            Self::SuspiciousBehavior => "Suspicious behavior detected",
            Self::MaliciousPayload => "Invalid request",
            Self::StoreUnavailable => "Internal server error",
        }
    }

    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklisted => "blacklisted",
            Self::Banned => "banned",
            Self::RateLimited => "rate_limited",
            Self::SuspiciousBehavior => "suspicious_behavior",
            Self::MaliciousPayload => "malicious_payload",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
}

impl Rejection {
    pub fn new(reason: RejectReason) -> Self {
        Self { reason }
    }

    pub fn status(&self) -> u16 {
        self.reason.status()
    }

    pub fn message(&self) -> &'static str {
        self.reason.message()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Admitted, with the payload sanitized when sanitization is on.
    Allow(RequestDescriptor),
    Reject(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Reject(r) => Some(r),
            Self::Allow(_) => None,
        }
    }
}

pub struct RequestGate {
    reputation: ReputationStore,
    rate_limiter: RateLimiter,
    behavior: BehaviorAnalyzer,
    inspector: PayloadInspector,
    sanitization: SanitizationConfig,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    store_config: StoreConfig,
    recent_window_ms: u64,
    active_client_ttl_ms: u64,
}

impl RequestGate {
    /// Build every stage from configuration. Fails on a bad detector pattern.
    pub fn from_config(
        config: &GuardConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let inspector = PayloadInspector::from_config(&config.sql_injection, &config.xss)?;
        let reputation = ReputationStore::new(&config.ip_filter, config.ban.clone(), store.clone(), clock.clone());
        let rate_limiter = RateLimiter::new(store.clone(), clock.clone(), config.rate_limit.clone());
        let behavior = BehaviorAnalyzer::new(
            store.clone(),
            clock.clone(),
            config.behavior.clone(),
            config.rate_limit.max_requests_per_ip,
        );

        tracing::info!(
            detectors = inspector.detector_count(),
            whitelist = config.ip_filter.whitelist.len(),
            blacklist = config.ip_filter.blacklist.len(),
            failure_policy = ?config.store.failure_policy,
            "Request gate ready"
        );

        Ok(Self {
            reputation,
            rate_limiter,
            behavior,
            inspector,
            sanitization: config.sanitization.clone(),
            store,
            clock,
            store_config: config.store.clone(),
            recent_window_ms: config.monitor.request_rate_window_ms,
            active_client_ttl_ms: config.monitor.active_client_ttl_ms,
        })
    }

    pub fn reputation(&self) -> &ReputationStore {
        &self.reputation
    }

    pub async fn decide(&self, mut request: RequestDescriptor) -> Decision {
        let client = request.client_key.clone();

        // Observational; a failure here never changes the verdict.
        let _ = self.bounded("traffic", self.record_traffic(&client)).await;

        if self.reputation.is_blacklisted(&client) {
            return self.reject(&client, RejectReason::Blacklisted, "client is blacklisted");
        }

        if self.reputation.is_whitelisted(&client) {
            metrics::record_decision("allow", "whitelisted");
            tracing::debug!(client = %client, path = %request.path, "Whitelisted client passed");
            return Decision::Allow(request);
        }

        match self.bounded("ban", self.reputation.is_banned(&client)).await {
            Ok(true) => return self.reject(&client, RejectReason::Banned, "active ban"),
            Ok(false) => {}
            Err(_) => {
                if let Some(decision) = self.on_store_failure(&client, "ban") {
                    return decision;
                }
            }
        }

        match self.bounded("rate_limit", self.rate_limiter.check(&client)).await {
            Ok(true) => {}
            Ok(false) => {
                self.ban(&client, "rate_limit").await;
                return self.reject(&client, RejectReason::RateLimited, "rate window exhausted");
            }
            Err(_) => {
                if let Some(decision) = self.on_store_failure(&client, "rate_limit") {
                    return decision;
                }
            }
        }

        match self.bounded("behavior", self.behavior.analyze(&client, &request)).await {
            Ok(report) if report.suspicious => {
                let signals: Vec<&str> = report.signals.iter().map(|s| s.kind.as_str()).collect();
                self.record_suspicious().await;
                self.ban(&client, "suspicious_behavior").await;
                return self.reject(
                    &client,
                    RejectReason::SuspiciousBehavior,
                    &format!("signals: {}", signals.join(",")),
                );
            }
            Ok(_) => {}
            Err(_) => {
                if let Some(decision) = self.on_store_failure(&client, "behavior") {
                    return decision;
                }
            }
        }

        let report = self.inspector.inspect(&request.payload);
        if report.is_malicious() {
            self.record_suspicious().await;
            return self.reject(
                &client,
                RejectReason::MaliciousPayload,
                &format!(
                    "sql_injection={} xss={} detectors={}",
                    report.sql_injection,
                    report.xss,
                    report.matched.join(",")
                ),
            );
        }

        if self.sanitization.enabled {
            sanitize_payload(&mut request.payload, &self.sanitization.fields);
        }

        metrics::record_decision("allow", "passed");
        tracing::debug!(
            client = %client,
            path = %request.path,
            method = %request.method,
            "Request passed security checks"
        );
        Decision::Allow(request)
    }

    /// Rejection owed to the client's standing alone: blacklist or an active
    /// ban. Used when a request is refused before the pipeline can run, so a
    /// listed or banned client still sees its own verdict. A store failure
    /// here yields `None`.
    pub async fn standing(&self, client: &str) -> Option<Rejection> {
        if self.reputation.is_blacklisted(client) {
            return Some(self.rejection(client, RejectReason::Blacklisted, "client is blacklisted"));
        }
        match self.bounded("ban", self.reputation.is_banned(client)).await {
            Ok(true) => Some(self.rejection(client, RejectReason::Banned, "active ban")),
            _ => None,
        }
    }

    /// Run a store call under the configured timeout, logging any failure.
    async fn bounded<T>(&self, stage: &'static str, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let limit_ms = self.store_config.timeout_ms;
        let result = match tokio::time::timeout(Duration::from_millis(limit_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit_ms)),
        };
        if let Err(e) = &result {
            metrics::record_store_error(stage);
            tracing::error!(stage, error = %e, "State store call failed");
        }
        result
    }

    /// `None` means continue as if the check passed.
    fn on_store_failure(&self, client: &str, stage: &'static str) -> Option<Decision> {
        match self.store_config.failure_policy {
            FailurePolicy::FailOpen => {
                tracing::warn!(client = %client, stage, "Skipping check, failing open");
                None
            }
            FailurePolicy::FailClosed => Some(self.reject(client, RejectReason::StoreUnavailable, stage)),
        }
    }

    async fn record_traffic(&self, client: &str) -> StoreResult<()> {
        let now = self.clock.now_ms();
        tokio::try_join!(
            self.store.incr(keys::TOTAL_REQUESTS),
            self.store.window_record(keys::RECENT_REQUESTS, now, self.recent_window_ms),
            self.store
                .set_add(keys::ACTIVE_CLIENTS, client, now, self.active_client_ttl_ms),
        )?;
        Ok(())
    }

    async fn record_suspicious(&self) {
        let _ = self
            .bounded("suspicious", self.store.incr(keys::SUSPICIOUS_ACTIVITIES))
            .await;
    }

    /// The verdict stands even if the ban cannot be written.
    async fn ban(&self, client: &str, reason: &'static str) {
        let _ = self.bounded("ban_write", self.reputation.ban_default(client, reason)).await;
    }

    fn reject(&self, client: &str, reason: RejectReason, detail: &str) -> Decision {
        Decision::Reject(self.rejection(client, reason, detail))
    }

    fn rejection(&self, client: &str, reason: RejectReason, detail: &str) -> Rejection {
        metrics::record_decision("reject", reason.as_str());
        tracing::warn!(
            client = %client,
            reason = reason.as_str(),
            status = reason.status(),
            detail,
            "Request rejected"
        );
        Rejection::new(reason)
    }
}

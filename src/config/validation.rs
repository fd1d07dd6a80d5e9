//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, limits and intervals > 0)
//! - Reject enabled detector sets with no patterns
//! - Reject unknown sanitization fields and unparsable addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Pattern compilation happens later, in the inspector, and fails just as fast

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GuardConfig;

/// Fields a sanitizer may be pointed at.
pub const SANITIZABLE_FIELDS: [&str; 3] = ["body", "query", "params"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if let Some(upstream) = &config.upstream.address {
        if upstream.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("upstream.address", "not a socket address"));
        }
    }

    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be > 0"));
    }
    if config.rate_limit.max_requests_per_ip == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests_per_ip", "must be > 0"));
    }
    if config.ban.ban_time_ms == 0 {
        errors.push(ValidationError::new("ban.ban_time_ms", "must be > 0"));
    }

    let behavior = &config.behavior;
    if behavior.enabled {
        if behavior.history_window_ms == 0 {
            errors.push(ValidationError::new("behavior.history_window_ms", "must be > 0"));
        }
        if behavior.speed_window_ms == 0 {
            errors.push(ValidationError::new("behavior.speed_window_ms", "must be > 0"));
        }
        if behavior.concurrency_ttl_ms == 0 {
            errors.push(ValidationError::new("behavior.concurrency_ttl_ms", "must be > 0"));
        }
        if !(behavior.speed_budget_ratio > 0.0 && behavior.speed_budget_ratio <= 1.0) {
            errors.push(ValidationError::new(
                "behavior.speed_budget_ratio",
                "must be in (0, 1]",
            ));
        }
    }

    if config.sql_injection.enabled && config.sql_injection.patterns.is_empty() {
        errors.push(ValidationError::new("sql_injection.patterns", "enabled with no patterns"));
    }
    if config.xss.enabled && config.xss.patterns.is_empty() {
        errors.push(ValidationError::new("xss.patterns", "enabled with no patterns"));
    }

    for field in &config.sanitization.fields {
        if !SANITIZABLE_FIELDS.contains(&field.as_str()) {
            errors.push(ValidationError::new(
                "sanitization.fields",
                format!("unknown field {:?}", field),
            ));
        }
    }

    if config.store.timeout_ms == 0 {
        errors.push(ValidationError::new("store.timeout_ms", "must be > 0"));
    }
    if config.store.janitor_interval_secs == 0 {
        errors.push(ValidationError::new("store.janitor_interval_secs", "must be > 0"));
    }

    if config.monitor.enabled {
        if config.monitor.interval_ms == 0 {
            errors.push(ValidationError::new("monitor.interval_ms", "must be > 0"));
        }
        if config.monitor.request_rate_window_ms == 0 {
            errors.push(ValidationError::new("monitor.request_rate_window_ms", "must be > 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

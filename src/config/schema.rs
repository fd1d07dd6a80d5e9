//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, body and request limits).
    pub listener: ListenerConfig,

    /// Where admitted requests go.
    pub upstream: UpstreamConfig,

    /// How the client key is derived from a request.
    pub client_key: ClientKeyConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Ban duration.
    pub ban: BanConfig,

    /// Static allow/deny lists.
    pub ip_filter: IpFilterConfig,

    /// Behavioral anomaly thresholds.
    pub behavior: BehaviorConfig,

    /// SQL injection detectors.
    pub sql_injection: SqlInjectionConfig,

    /// Cross-site scripting detectors.
    pub xss: XssConfig,

    /// Payload sanitization.
    pub sanitization: SanitizationConfig,

    /// Shared store access policy.
    pub store: StoreConfig,

    /// Metrics collection and alerting loop.
    pub monitor: MonitorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body the gate will buffer for inspection.
    pub max_body_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 30,
        }
    }
}

/// Upstream configuration. Without an address the guard echoes admitted payloads.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: Option<String>,

    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: None,
            timeout_secs: 30,
        }
    }
}

/// Client key derivation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientKeyConfig {
    /// Header set by a trusted proxy in front of the guard (e.g., "x-forwarded-for").
    /// The first address in the header is used. When unset, the peer IP is the key.
    pub forwarded_header: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window width in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per client inside one window.
    pub max_requests_per_ip: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60 * 1000,
            max_requests_per_ip: 1000,
        }
    }
}

/// Ban configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BanConfig {
    /// How long a ban lasts in milliseconds.
    pub ban_time_ms: u64,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            ban_time_ms: 30 * 60 * 1000,
        }
    }
}

/// Static IP filter lists.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IpFilterConfig {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

/// Behavioral analysis thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub enabled: bool,

    /// Rolling history window for repetition analysis.
    pub history_window_ms: u64,

    /// Same-path hits inside the history window above which a client is suspicious.
    pub same_path_threshold: u64,

    /// Same-method hits inside the history window above which a client is suspicious.
    pub same_method_threshold: u64,

    /// Burst window.
    pub speed_window_ms: u64,

    /// Fraction of `rate_limit.max_requests_per_ip` allowed inside one burst window.
    pub speed_budget_ratio: f64,

    /// Lifetime of the in-flight counter.
    pub concurrency_ttl_ms: u64,

    /// In-flight requests above which a client is suspicious.
    pub concurrency_threshold: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_window_ms: 5 * 60 * 1000,
            same_path_threshold: 50,
            same_method_threshold: 100,
            speed_window_ms: 1000,
            speed_budget_ratio: 0.1,
            concurrency_ttl_ms: 1000,
            concurrency_threshold: 20,
        }
    }
}

/// SQL injection detector patterns.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlInjectionConfig {
    pub enabled: bool,
    pub patterns: Vec<String>,
}

impl Default for SqlInjectionConfig {
    fn default() -> Self {
        // Comment markers, quote escapes, `'or` tautologies and `'union`.
        Self {
            enabled: true,
            patterns: vec![
                r"(?i)(%27)|(')|(--)|(%23)|(#)".to_string(),
                r"(?i)((%3D)|(=))[^\n]*((%27)|(')|(--)|(%3B)|(;))".to_string(),
                r"(?i)\w*((%27)|('))((%6F)|o|(%4F))((%72)|r|(%52))".to_string(),
                r"(?i)((%27)|('))union".to_string(),
            ],
        }
    }
}

/// Cross-site scripting detector patterns.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct XssConfig {
    pub enabled: bool,
    pub patterns: Vec<String>,
}

impl Default for XssConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                r"(?is)<script\b[^>]*>.*?</script>".to_string(),
                r"(?i)javascript:".to_string(),
                r"(?i)onerror=".to_string(),
                r"(?i)onload=".to_string(),
                r"(?i)onclick=".to_string(),
            ],
        }
    }
}

/// Request sanitization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizationConfig {
    pub enabled: bool,

    /// Which payload fragments to escape: any of "body", "query", "params".
    pub fields: Vec<String>,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fields: vec!["body".to_string(), "query".to_string(), "params".to_string()],
        }
    }
}

/// What the gate does when the shared store cannot answer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip the failed check and keep evaluating.
    #[default]
    FailOpen,
    /// Reject the request.
    FailClosed,
}

/// Shared store access.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Deadline for a single store call.
    pub timeout_ms: u64,

    pub failure_policy: FailurePolicy,

    /// How often expired keys are swept.
    pub janitor_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 50,
            failure_policy: FailurePolicy::FailOpen,
            janitor_interval_secs: 60,
        }
    }
}

/// Metrics loop and alert thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,

    /// Collection interval.
    pub interval_ms: u64,

    /// Width of the request-rate window.
    pub request_rate_window_ms: u64,

    /// How long snapshots are kept.
    pub history_retention_ms: u64,

    /// How long a client counts as active after its last request.
    pub active_client_ttl_ms: u64,

    /// `high_traffic` fires above this many requests per rate window.
    pub high_traffic_threshold: u64,

    /// `many_bans` fires above this many banned clients.
    pub many_bans_threshold: u64,

    /// `suspicious_activity` fires above this many suspicious events.
    pub suspicious_activity_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
            request_rate_window_ms: 60 * 1000,
            history_retention_ms: 24 * 60 * 60 * 1000,
            active_client_ttl_ms: 60 * 1000,
            high_traffic_threshold: 10_000,
            many_bans_threshold: 1000,
            suspicious_activity_threshold: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is static: loaded once at startup, any error is fatal
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BanConfig, BehaviorConfig, ClientKeyConfig, FailurePolicy, GuardConfig,
    IpFilterConfig, ListenerConfig, LogFormat, MonitorConfig, ObservabilityConfig,
    RateLimitConfig, SanitizationConfig, SqlInjectionConfig, StoreConfig, UpstreamConfig,
    XssConfig,
};

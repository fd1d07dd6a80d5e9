//! Edge request guard library.
//!
//! Rate limiting, client reputation, behavioral anomaly detection and
//! payload inspection in front of an HTTP service, plus a periodic metrics
//! and alerting loop over the shared state they write.

pub mod admin;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;

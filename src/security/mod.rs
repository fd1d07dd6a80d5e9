//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (as a RequestDescriptor):
//!     → gate.rs (fixed-order pipeline)
//!         → reputation.rs (static lists, bans)
//!         → rate_limit.rs (sliding window per client)
//!         → behavior.rs (repetition, speed, concurrency)
//!         → payload.rs (SQLi / XSS detectors)
//!         → sanitize.rs (HTML-escape admitted payloads)
//!     → Allow or Reject
//! ```
//!
//! # Design Decisions
//! - Defense in depth: several cheap checks instead of one expensive one
//! - All per-client state lives in the shared store, never in these structs
//! - No trust in client input

pub mod behavior;
pub mod descriptor;
pub mod gate;
pub mod payload;
pub mod rate_limit;
pub mod reputation;
pub mod sanitize;

pub use behavior::{BehaviorAnalyzer, BehaviorReport, Signal, SignalKind};
pub use descriptor::{Payload, RequestDescriptor};
pub use gate::{Decision, RejectReason, Rejection, RequestGate};
pub use payload::{Detector, InspectionReport, PayloadInspector, ThreatCategory};
pub use rate_limit::RateLimiter;
pub use reputation::{BanRecord, ReputationStore};

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → middleware/gate.rs (build descriptor, run the gate)
//!     → request.rs (client key, payload extraction and write-back)
//!     → server.rs (forward upstream or echo)
//!     → response.rs (rejections and errors as JSON)
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{GatedRequest, X_REQUEST_ID};
pub use server::GuardServer;

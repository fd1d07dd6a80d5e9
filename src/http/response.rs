//! Response helpers.
//!
//! # Design Decisions
//! - Every error body is `{"error": "<generic message>"}`
//! - Rejections never carry matched patterns or thresholds
//! - Upstream timeouts map to 504, other upstream failures to 502

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::gate::Rejection;

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::FORBIDDEN);
        error_response(status, self.message())
    }
}

//! Gate middleware.
//! Runs the request pipeline ahead of every handler.
//!
//! Whitelisted clients skip everything after the list check, so their body is
//! streamed through untouched. Everyone else has the body buffered up to
//! `max_body_bytes`; an oversized body from a blacklisted or banned client is
//! answered with that verdict rather than 413.

use axum::{
    body::Body,
    extract::{FromRequestParts, RawPathParams, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::ClientKeyConfig;
use crate::http::request::{self, GatedRequest};
use crate::http::response::error_response;
use crate::security::descriptor::{Payload, RequestDescriptor};
use crate::security::gate::{Decision, RequestGate};

/// What the middleware needs from the server.
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<RequestGate>,
    pub clock: Arc<dyn Clock>,
    pub client_key: ClientKeyConfig,
    pub max_body_bytes: usize,
}

pub async fn gate_middleware(State(state): State<GateState>, req: Request<Body>, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let client_key = request::client_key(&parts, &state.client_key);
    let request_id = request::request_id(&parts);

    if state.gate.reputation().is_whitelisted(&client_key) {
        let payload = Payload {
            body: Value::Null,
            query: request::parse_query(parts.uri.query()),
            params: path_params(&mut parts).await,
        };
        let admitted = match state.gate.decide(descriptor(&state, &parts, &client_key, payload)).await {
            Decision::Allow(admitted) => admitted,
            Decision::Reject(rejection) => return rejection.into_response(),
        };
        parts.extensions.insert(GatedRequest {
            client_key,
            request_id,
            payload: admitted.payload,
        });
        return next.run(Request::from_parts(parts, body)).await;
    }

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Some(rejection) = state.gate.standing(&client_key).await {
                return rejection.into_response();
            }
            tracing::warn!(client = %client_key, error = %e, limit = state.max_body_bytes, "Request body rejected");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large");
        }
    };

    let (body_value, body_kind) = request::parse_body(&bytes, request::content_type(&parts));
    let received = Payload {
        body: body_value,
        query: request::parse_query(parts.uri.query()),
        params: path_params(&mut parts).await,
    };

    let admitted = match state
        .gate
        .decide(descriptor(&state, &parts, &client_key, received.clone()))
        .await
    {
        Decision::Allow(admitted) => admitted,
        Decision::Reject(rejection) => return rejection.into_response(),
    };

    tracing::debug!(
        client = %client_key,
        request_id = request_id.as_deref().unwrap_or("none"),
        path = %admitted.path,
        method = %admitted.method,
        "Request admitted"
    );

    let payload = admitted.payload;
    if payload.query != received.query {
        let query = request::encode_query(&payload.query);
        parts.uri = request::with_query(&parts.uri, query.as_deref());
    }
    let body = match (payload.body != received.body)
        .then(|| request::encode_body(&payload.body, body_kind))
        .flatten()
    {
        Some(sanitized) => {
            request::set_content_length(&mut parts, sanitized.len());
            sanitized
        }
        None => bytes,
    };

    parts.extensions.insert(GatedRequest {
        client_key,
        request_id,
        payload,
    });

    next.run(Request::from_parts(parts, Body::from(body))).await
}

async fn path_params(parts: &mut Parts) -> Value {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(raw) => request::params_value(raw.iter()),
        Err(_) => request::params_value(std::iter::empty()),
    }
}

fn descriptor(state: &GateState, parts: &Parts, client_key: &str, payload: Payload) -> RequestDescriptor {
    let mut descriptor =
        RequestDescriptor::new(client_key, parts.method.as_str(), parts.uri.path()).with_payload(payload);
    descriptor.headers = request::header_map(parts);
    descriptor.timestamp = state.clock.now_ms();
    descriptor
}

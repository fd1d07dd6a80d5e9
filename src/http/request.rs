//! Request extraction for the gate.
//!
//! # Responsibilities
//! - Derive the client key (trusted forwarded header, else peer IP)
//! - Turn body, query string and path params into JSON fragments
//! - Write sanitized fragments back into the request before it moves on
//!
//! # Design Decisions
//! - JSON and urlencoded form bodies are parsed into trees; any other body
//!   is inspected as one string leaf and forwarded byte for byte
//! - A fragment is re-encoded only when sanitization changed it
//! - Repeated query and form keys collect into an array, in arrival order
//! - Headers that are not valid UTF-8 are left out of the descriptor

use axum::{
    body::Bytes,
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderValue, Request, Uri},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::ClientKeyConfig;
use crate::security::descriptor::Payload;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request IDs are random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Attached to every request the gate admits.
#[derive(Debug, Clone)]
pub struct GatedRequest {
    pub client_key: String,
    pub request_id: Option<String>,
    /// The payload after sanitization.
    pub payload: Payload,
}

/// The key all per-client state is stored under.
pub fn client_key(parts: &Parts, config: &ClientKeyConfig) -> String {
    if let Some(name) = &config.forwarded_header {
        let forwarded = parts
            .headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(key) = forwarded {
            return key.to_string();
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn request_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn header_map(parts: &Parts) -> BTreeMap<String, String> {
    parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// How the body was understood, so it can be written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    Form,
    /// UTF-8 that is neither JSON nor a form.
    Text,
    /// Not UTF-8; inspected lossily.
    Binary,
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn is_form(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

pub fn content_type(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

pub fn parse_body(bytes: &Bytes, content_type: Option<&str>) -> (Value, BodyKind) {
    if bytes.is_empty() {
        return (Value::Null, BodyKind::Empty);
    }
    if is_form(content_type) {
        return (parse_pairs(bytes), BodyKind::Form);
    }
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return (value, BodyKind::Json);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => (Value::String(text.to_string()), BodyKind::Text),
        Err(_) => (
            Value::String(String::from_utf8_lossy(bytes).into_owned()),
            BodyKind::Binary,
        ),
    }
}

/// Bytes for a sanitized body, or `None` when the original must be kept.
pub fn encode_body(body: &Value, kind: BodyKind) -> Option<Bytes> {
    match kind {
        BodyKind::Json => Some(Bytes::from(body.to_string())),
        BodyKind::Form => Some(Bytes::from(encode_query(body).unwrap_or_default())),
        BodyKind::Empty | BodyKind::Text | BodyKind::Binary => None,
    }
}

pub fn parse_query(query: Option<&str>) -> Value {
    parse_pairs(query.unwrap_or_default().as_bytes())
}

fn parse_pairs(input: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let value = Value::String(value.into_owned());
        match map.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

pub fn encode_query(query: &Value) -> Option<String> {
    let Value::Object(map) = query else {
        return None;
    };
    if map.is_empty() {
        return None;
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    serializer.append_pair(key, &leaf_text(item));
                }
            }
            other => {
                serializer.append_pair(key, &leaf_text(other));
            }
        }
    }
    Some(serializer.finish())
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn params_value<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Value {
    Value::Object(
        params
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}

/// Replace the query string of `uri`, keeping scheme, authority and path.
pub fn with_query(uri: &Uri, query: Option<&str>) -> Uri {
    let path_and_query = match query {
        Some(q) => format!("{}?{}", uri.path(), q),
        None => uri.path().to_string(),
    };
    let mut parts = uri.clone().into_parts();
    match path_and_query.parse() {
        Ok(pq) => {
            parts.path_and_query = Some(pq);
            Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
        }
        Err(_) => uri.clone(),
    }
}

/// Set `content-length` to match a rewritten body.
pub fn set_content_length(parts: &mut Parts, len: usize) {
    parts.headers.remove(header::TRANSFER_ENCODING);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

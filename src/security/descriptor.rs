//! Request descriptor seen by every pipeline stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The inspectable parts of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub body: Value,
    pub query: Value,
    pub params: Value,
}

impl Payload {
    /// A payload with empty query and params objects and no body.
    pub fn empty() -> Self {
        Self {
            body: Value::Null,
            query: Value::Object(Default::default()),
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Mutable access to a fragment by its configured field name.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match name {
            "body" => Some(&mut self.body),
            "query" => Some(&mut self.query),
            "params" => Some(&mut self.params),
            _ => None,
        }
    }
}

/// One inbound request, as the gate sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub client_key: String,
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Payload,
    /// Milliseconds since the epoch, stamped when the descriptor was built.
    pub timestamp: u64,
}

impl RequestDescriptor {
    pub fn new(client_key: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            path: path.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            payload: Payload::empty(),
            timestamp: 0,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

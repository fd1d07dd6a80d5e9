//! HTML-escaping of admitted payloads.

use serde_json::Value;

use crate::security::descriptor::Payload;

/// Escape `& < > " ' /` for safe embedding in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape every string leaf in place. Keys and non-string leaves are untouched.
pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(s) => *s = escape_html(s),
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => map.values_mut().for_each(sanitize_value),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Sanitize the named payload fragments. Unknown names are skipped.
pub fn sanitize_payload(payload: &mut Payload, fields: &[String]) {
    for field in fields {
        if let Some(value) = payload.field_mut(field) {
            sanitize_value(value);
        }
    }
}

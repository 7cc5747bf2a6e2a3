//! Request-side capture: normalized path, query parameters and body
//!
//! The body is read only when it is small enough and of a textual content
//! type. When it is read, the handler gets a fresh body built from the same
//! bytes, so capture is invisible downstream.

use std::borrow::Cow;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderMap},
};
use serde_json::{map::Entry, Map, Value};
use tracing::{debug, warn};

use super::policy::AuditPolicy;

/// Key used for bodies that could not be decoded into fields
pub const RAW_BODY_KEY: &str = "body";

/// Logical resource path of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    /// Path without API prefix, trailing slash or trailing numeric id
    pub path: String,
    pub resource_id: Option<i64>,
}

/// Strip the API prefix and split off a trailing numeric id
///
/// `/api/v1/materials/42` -> `/materials` + `42`. Paths outside the prefix
/// are kept as they are; the bare prefix becomes `/`.
pub fn normalize_path(raw: &str, prefix: &str) -> ResourcePath {
    let stripped = if prefix.is_empty() {
        raw
    } else {
        match raw.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => raw,
        }
    };

    let mut path = stripped.trim_end_matches('/');
    let mut resource_id = None;

    if let Some((head, last)) = path.rsplit_once('/') {
        if let Ok(id) = last.parse::<i64>() {
            resource_id = Some(id);
            path = head;
        }
    }

    let path = if path.is_empty() { "/".to_string() } else { path.to_string() };

    ResourcePath { path, resource_id }
}

/// Fold key/value pairs into a map; repeated keys become arrays
fn pairs_to_map<'a, I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
{
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match map.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            },
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                },
            },
        }
    }
    map
}

pub fn query_params(query: Option<&str>) -> Map<String, Value> {
    match query {
        Some(query) => pairs_to_map(url::form_urlencoded::parse(query.as_bytes())),
        None => Map::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Content type and length gate for body capture
fn capturable_body(headers: &HeaderMap, max_bytes: usize) -> Option<BodyKind> {
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    if length == 0 || length > max_bytes as u64 {
        return None;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        Some(BodyKind::Json)
    } else if content_type.contains("application/x-www-form-urlencoded") {
        Some(BodyKind::Form)
    } else {
        None
    }
}

/// Merge a captured body into the request map
///
/// JSON objects are merged field by field. Form bodies that are not JSON are
/// decoded as pairs and treated the same way. Everything else is kept as raw
/// text under [`RAW_BODY_KEY`].
fn merge_body(params: &mut Map<String, Value>, kind: BodyKind, bytes: &[u8]) {
    let decoded = match serde_json::from_slice::<Map<String, Value>>(bytes) {
        Ok(map) => Some(map),
        Err(_) if kind == BodyKind::Form && std::str::from_utf8(bytes).is_ok() => {
            Some(pairs_to_map(url::form_urlencoded::parse(bytes)))
        },
        Err(_) => None,
    };

    match decoded {
        Some(fields) => params.extend(fields),
        None => {
            params.insert(
                RAW_BODY_KEY.to_string(),
                Value::String(String::from_utf8_lossy(bytes).into_owned()),
            );
        },
    }
}

/// Everything taken from the request before the handler runs
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    pub path: String,
    pub resource_id: Option<i64>,
    pub params: Map<String, Value>,
}

impl CapturedRequest {
    /// JSON text stored in the record's `request` column
    pub fn request_json(&self) -> String {
        Value::Object(self.params.clone()).to_string()
    }
}

/// Capture query and body, handing back a request with an intact body
///
/// Never fails: a body that cannot be read is simply not captured. Sensitive
/// keys are masked on the merged map, so query parameters are covered too.
pub async fn capture_request(
    request: Request,
    resource: ResourcePath,
    policy: &AuditPolicy,
) -> (Request, CapturedRequest) {
    let (request, mut captured) = read_request(request, resource, policy.max_body_bytes()).await;
    policy.redactor().redact(&mut captured.params);
    (request, captured)
}

async fn read_request(
    request: Request,
    resource: ResourcePath,
    max_body_bytes: usize,
) -> (Request, CapturedRequest) {
    let mut captured = CapturedRequest {
        path: resource.path,
        resource_id: resource.resource_id,
        params: query_params(request.uri().query()),
    };

    let Some(kind) = capturable_body(request.headers(), max_body_bytes) else {
        return (request, captured);
    };

    let (parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // The stream is gone at this point; the handler sees an empty body,
            // just as it would have seen the same transport error.
            warn!(
                method = %parts.method,
                uri = %parts.uri,
                error = %e,
                "Failed to capture request body"
            );
            return (Request::from_parts(parts, Body::empty()), captured);
        },
    };

    debug!(
        method = %parts.method,
        uri = %parts.uri,
        body_size = bytes.len(),
        "Captured request body"
    );

    merge_body(&mut captured.params, kind, &bytes);

    (Request::from_parts(parts, Body::from(bytes)), captured)
}

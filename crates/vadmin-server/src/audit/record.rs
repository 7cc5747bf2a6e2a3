//! Audit record model and assembly

use std::time::{Duration, Instant};

use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::capture::CapturedRequest;
use super::identity::{CallerIdentity, CallerSlot};
use super::tee::ResponseTee;

/// One audited API call, ready to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// HTTP verb, uppercase
    pub method: String,
    /// Normalized path, no prefix, query string or trailing id
    pub path: String,
    pub resource_id: Option<i64>,
    /// JSON object of query parameters and redacted body fields
    pub request: String,
    /// 0 for anonymous callers
    pub user_id: i64,
    pub username: String,
    /// OS/device and browser, e.g. "Windows Chrome 120"
    pub platform: String,
    pub description: String,
    pub ip: String,
    /// Milliseconds with two decimals, e.g. "12.34"
    pub elapsed_ms: String,
    pub status_code: u16,
    /// `msg` of a `{msg, data}` response envelope
    pub response_msg: String,
    /// Serialized envelope `data`, or the raw response text
    pub response: String,
}

/// Audit row as stored in `sys_records`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredAuditRecord {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub resource_id: Option<i64>,
    pub request: String,
    pub user_id: i64,
    pub username: String,
    pub platform: String,
    pub description: String,
    pub ip: String,
    pub elapsed: String,
    pub status_code: i32,
    pub response_msg: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Standard response envelope of the admin API
///
/// Missing or `null` fields fall back to empty values, so any JSON object
/// is read as an envelope.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: JsonValue,
}

/// Split a response body into `(response_msg, response)`
///
/// JSON objects (and `null`) are read as `{msg, data}`. Other bodies are
/// returned verbatim with an empty message.
pub fn split_envelope(body: &[u8]) -> (String, String) {
    let envelope = match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Null) => Some((String::new(), JsonValue::Null.to_string())),
        Ok(object @ JsonValue::Object(_)) => serde_json::from_value::<ResponseEnvelope>(object)
            .ok()
            .map(|e| (e.msg.unwrap_or_default(), e.data.to_string())),
        _ => None,
    };

    envelope.unwrap_or_else(|| (String::new(), String::from_utf8_lossy(body).into_owned()))
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64() * 1000.0)
}

/// Request-side half of a record, completed once the response is done
#[derive(Debug)]
pub struct RecordDraft {
    pub started: Instant,
    pub method: Method,
    pub captured: CapturedRequest,
    pub description: String,
    pub ip: String,
    pub platform: String,
    /// Identity already present when the request reached the audit layer
    pub caller: Option<CallerIdentity>,
    /// Identity filled in by auth middleware further down the chain
    pub slot: CallerSlot,
}

impl RecordDraft {
    pub fn complete(self, tee: ResponseTee) -> AuditRecord {
        let elapsed_ms = format_elapsed(self.started.elapsed());
        let (response_msg, response) = split_envelope(tee.bytes());
        let caller = self.slot.get().cloned().or(self.caller).unwrap_or_default();
        let request = self.captured.request_json();

        AuditRecord {
            method: self.method.as_str().to_uppercase(),
            path: self.captured.path,
            resource_id: self.captured.resource_id,
            request,
            user_id: caller.user_id,
            username: caller.username,
            platform: self.platform,
            description: self.description,
            ip: self.ip,
            elapsed_ms,
            status_code: tee.status().map(|s| s.as_u16()).unwrap_or_default(),
            response_msg,
            response,
        }
    }
}

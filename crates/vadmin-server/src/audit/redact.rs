//! Masking of sensitive request fields

use serde_json::{Map, Value};

/// Replacement value for redacted fields
pub const MASK: &str = "***";

/// Keys masked when nothing else is configured
pub const DEFAULT_SENSITIVE_KEYS: [&str; 5] =
    ["password", "pwd", "token", "access_token", "refresh_token"];

/// Replaces configured top-level keys of a decoded body with [`MASK`]
///
/// Nested objects are left as they are: `{"user": {"password": ".."}}` is
/// stored unmasked.
#[derive(Debug, Clone)]
pub struct SensitiveRedactor {
    keys: Vec<String>,
}

impl SensitiveRedactor {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn redact(&self, body: &mut Map<String, Value>) {
        for key in &self.keys {
            if let Some(value) = body.get_mut(key) {
                *value = Value::String(MASK.to_string());
            }
        }
    }
}

impl Default for SensitiveRedactor {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_KEYS)
    }
}

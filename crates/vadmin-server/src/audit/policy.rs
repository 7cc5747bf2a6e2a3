//! Which calls are audited, and how

use std::collections::HashSet;

use axum::http::Method;

use super::describe::DescriptionResolver;
use super::redact::SensitiveRedactor;
use crate::config::AuditConfig;

/// Immutable audit settings shared by every request
///
/// Built once from [`AuditConfig`] at startup and handed to the audit layer,
/// which keeps it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AuditPolicy {
    api_prefix: String,
    skip_paths: HashSet<String>,
    max_body_bytes: usize,
    redactor: SensitiveRedactor,
    resolver: DescriptionResolver,
}

impl AuditPolicy {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            api_prefix: config.api_prefix.clone(),
            skip_paths: config.skip_paths.iter().cloned().collect(),
            max_body_bytes: config.max_body_bytes,
            redactor: SensitiveRedactor::new(config.sensitive_keys.iter().cloned()),
            resolver: DescriptionResolver::new(config.descriptions.iter().cloned()),
        }
    }

    /// Decide whether a call is recorded
    ///
    /// Safe methods (`GET`, `HEAD`, `OPTIONS`, `TRACE`) have no side effect to
    /// record. Skip paths are matched exactly against the normalized path.
    pub fn should_audit(&self, method: &Method, path: &str) -> bool {
        !method.is_safe() && !self.skip_paths.contains(path)
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn redactor(&self) -> &SensitiveRedactor {
        &self.redactor
    }

    pub fn describe(&self, method: &Method, path: &str) -> String {
        self.resolver.resolve(method, path)
    }
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self::from_config(&AuditConfig::default())
    }
}

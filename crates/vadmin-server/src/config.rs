//! Configuration management

use serde::{Deserialize, Serialize};

use crate::audit::{DescriptionOverride, DEFAULT_SENSITIVE_KEYS};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/vadmin";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:5666";

// ============================================================================
// Audit Configuration Constants
// ============================================================================

/// Mount point of the versioned API; stripped before paths are audited.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Request and response bodies above this size are never decoded (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 << 20;

/// Normalized paths that are never audited.
pub const DEFAULT_SKIP_PATHS: &[&str] = &["/health"];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Audit capture configuration
///
/// Read once at startup; the audit layer works on an immutable copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Prefix stripped from request paths, e.g. `/api/v1`. Empty means none.
    pub api_prefix: String,
    /// Top-level body keys whose values are replaced by `***`
    pub sensitive_keys: Vec<String>,
    /// Normalized paths that are never audited
    pub skip_paths: Vec<String>,
    /// Upper bound for captured request and response bodies
    pub max_body_bytes: usize,
    /// Exact `(verb, path)` descriptions that take precedence over conventions
    pub descriptions: Vec<DescriptionOverride>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            sensitive_keys: DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
            skip_paths: DEFAULT_SKIP_PATHS.iter().map(|p| p.to_string()).collect(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            descriptions: Vec::new(),
        }
    }
}

impl AuditConfig {
    /// Build from defaults plus `AUDIT_*` environment variables
    ///
    /// `AUDIT_SENSITIVE_KEYS` and `AUDIT_SKIP_PATHS` extend the defaults
    /// rather than replacing them.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut audit = Self::default();

        if let Ok(prefix) = std::env::var("AUDIT_API_PREFIX") {
            audit.api_prefix = prefix.trim().to_string();
        }
        if let Ok(keys) = std::env::var("AUDIT_SENSITIVE_KEYS") {
            extend_unique(&mut audit.sensitive_keys, split_list(&keys, ','));
        }
        if let Ok(paths) = std::env::var("AUDIT_SKIP_PATHS") {
            extend_unique(&mut audit.skip_paths, split_list(&paths, ','));
        }
        if let Some(bytes) = std::env::var("AUDIT_MAX_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            audit.max_body_bytes = bytes;
        }
        if let Ok(entries) = std::env::var("AUDIT_DESCRIPTIONS") {
            for entry in split_list(&entries, ';') {
                audit.descriptions.push(entry.parse()?);
            }
        }

        Ok(audit)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.api_prefix.is_empty()
            && (!self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/'))
        {
            anyhow::bail!(
                "Audit API prefix '{}' must start with '/' and must not end with '/'",
                self.api_prefix
            );
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("Audit max_body_bytes must be greater than 0");
        }

        if let Some(path) = self.skip_paths.iter().find(|p| !p.starts_with('/')) {
            anyhow::bail!("Audit skip path '{}' must start with '/'", path);
        }

        Ok(())
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("VADMIN_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("VADMIN_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "VADMIN_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_parse(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: split_list(
                    &std::env::var("CORS_ALLOWED_ORIGINS")
                        .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string()),
                    ',',
                ),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
            audit: AuditConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        self.audit.validate()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            audit: AuditConfig::default(),
        }
    }
}

//! Audit trail for mutating API calls
//!
//! Every `POST`, `PUT`, `PATCH` and `DELETE` that reaches the API is recorded
//! with its redacted parameters, the response envelope, the caller and the
//! time it took. Reads and configured paths are not recorded.
//!
//! # Architecture
//!
//! - **Policy**: skip rules, body size cap, redaction keys and descriptions,
//!   built once from [`AuditConfig`](crate::config::AuditConfig)
//! - **Capture**: query and body are read before the handler runs, and the
//!   body is restored byte for byte
//! - **Tee**: the response streams to the client while a bounded copy is kept
//! - **Persistence**: records are stored on a detached task through an
//!   [`AuditSink`]; failures are logged and never reach the client
//!
//! # Usage
//!
//! ```no_run
//! use axum::{routing::post, Router};
//! use sqlx::PgPool;
//! use vadmin_server::audit::{AuditLayer, AuditPolicy};
//!
//! # async fn example(pool: PgPool) {
//! let app: Router = Router::new()
//!     .route("/api/v1/materials", post(|| async { "ok" }))
//!     .layer(AuditLayer::postgres(pool, AuditPolicy::default()));
//! # }
//! ```
//!
//! Auth middleware running inside the layer reports the caller with
//! [`attach_caller`].

mod capture;
mod client;
mod describe;
mod identity;
mod middleware;
mod persist;
mod policy;
mod record;
mod redact;
mod tee;

pub use capture::{normalize_path, query_params, CapturedRequest, ResourcePath, RAW_BODY_KEY};
pub use client::{client_ip, platform};
pub use describe::{DescriptionOverride, DescriptionResolver};
pub use identity::{attach_caller, CallerIdentity, CallerSlot};
pub use middleware::{AuditLayer, AuditMiddleware};
pub use persist::{AsyncPersister, AuditSink, PgAuditSink};
pub use policy::AuditPolicy;
pub use record::{format_elapsed, split_envelope, AuditRecord, StoredAuditRecord};
pub use redact::{SensitiveRedactor, DEFAULT_SENSITIVE_KEYS, MASK};
pub use tee::{ResponseTee, TeeBody};

//! vadmin Server Library
//!
//! Administrative HTTP API host with request/response audit capture.
//!
//! # Overview
//!
//! Business routes (materials, users, roles) are mounted by the embedding
//! application. This crate provides the pieces around them:
//!
//! - **Audit**: a tower layer that records every mutating call (method, path,
//!   redacted request, response envelope, caller, client, latency) and stores
//!   it without delaying the response
//! - **Configuration**: environment-based configuration management
//! - **Middleware**: CORS and request tracing
//!
//! # Audit Capture
//!
//! - `GET` (and the other safe methods) are never audited
//! - Configured paths such as `/health` are never audited
//! - JSON and form bodies up to 2 MiB are captured, redacted and restored for
//!   the handler
//! - The response is streamed to the client unchanged while a bounded copy is
//!   kept for the record
//! - Records are written on a detached task; storage failures are only logged
//!
//! # Example
//!
//! ```no_run
//! use axum::Router;
//! use vadmin_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let db = sqlx::PgPool::connect(&config.database.url).await?;
//!     let app = api::create_router(api::AppState { db }, &config, Router::new());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;

pub use error::{AppError, AuditError};

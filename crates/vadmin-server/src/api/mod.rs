//! HTTP surface: router assembly and the health endpoint
//!
//! Business routes (materials, users, roles, ...) are supplied by the caller
//! and mounted under the configured API prefix next to `/health`.

pub mod response;

use axum::{extract::State, routing::get, Router};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;

use crate::audit::{AuditLayer, AuditPolicy};
use crate::config::Config;
use crate::error::AppError;
use crate::middleware::{cors_layer, tracing_layer};

pub use response::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}

/// Build the application router with PostgreSQL-backed auditing
pub fn create_router(state: AppState, config: &Config, business: Router) -> Router {
    let audit = AuditLayer::postgres(state.db.clone(), AuditPolicy::from_config(&config.audit));
    create_router_with_audit(state, config, business, audit)
}

/// Build the application router around a given audit layer
///
/// The audit layer sits directly around the routes so it sees uncompressed
/// bodies; compression, tracing and CORS wrap it in that order.
pub fn create_router_with_audit(
    state: AppState,
    config: &Config,
    business: Router,
    audit: AuditLayer,
) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(business);

    let prefix = config.audit.api_prefix.as_str();
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    app.layer(audit)
        .layer(CompressionLayer::new())
        .layer(tracing_layer())
        .layer(cors_layer(&config.cors))
}

async fn health(State(state): State<AppState>) -> Result<ApiResponse<JsonValue>, AppError> {
    sqlx::query("SELECT 1").execute(&state.db).await?;

    Ok(ApiResponse::success(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

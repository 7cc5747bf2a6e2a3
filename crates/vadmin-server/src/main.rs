//! vadmin Server - Main entry point

use anyhow::Result;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::{info, warn};
use vadmin_common::logging::{init_logging, LogConfig};

use vadmin_server::{
    api::{self, AppState},
    audit::{AsyncPersister, AuditLayer, AuditPolicy, PgAuditSink},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("vadmin-server")
        .filter_directives("vadmin_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting vadmin server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        api_prefix = %config.audit.api_prefix,
        "Configuration loaded"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let persister = AsyncPersister::new(PgAuditSink::new(db_pool.clone()));
    let audit = AuditLayer::new(AuditPolicy::from_config(&config.audit), persister.clone());

    // Business modules are mounted by the embedding application; the bare
    // binary serves health and audit only.
    let app = api::create_router_with_audit(
        AppState { db: db_pool.clone() },
        &config,
        Router::new(),
        audit,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Connections are closed; records of the last responses may still be in flight.
    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    info!(pending = persister.pending(), "Waiting for audit writes to finish");
    if !persister.drain(grace).await {
        warn!(
            pending = persister.pending(),
            "Shutdown timeout reached with audit writes still running"
        );
    }
    db_pool.close().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

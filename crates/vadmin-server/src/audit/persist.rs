//! Audit record storage
//!
//! Storage is detached from the request: [`AsyncPersister::schedule`] spawns
//! the write and returns at once. A failing or panicking sink is logged with
//! the full record and otherwise ignored. On shutdown, [`AsyncPersister::drain`]
//! waits for writes that are still running.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;
use sqlx::PgPool;
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};
use tracing::{debug, error, warn};

use super::record::{AuditRecord, StoredAuditRecord};
use crate::error::AuditError;

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Stores records in the `sys_records` table
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a record and return the stored row
    pub async fn insert(&self, record: &AuditRecord) -> Result<StoredAuditRecord, AuditError> {
        let stored = sqlx::query_as::<_, StoredAuditRecord>(
            r#"
            INSERT INTO sys_records (
                method, path, resource_id, request, user_id, username,
                platform, description, ip, elapsed, status_code,
                response_msg, response
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, method, path, resource_id, request, user_id, username,
                      platform, description, ip, elapsed, status_code,
                      response_msg, response, created_at
            "#,
        )
        .bind(&record.method)
        .bind(&record.path)
        .bind(record.resource_id)
        .bind(&record.request)
        .bind(record.user_id)
        .bind(&record.username)
        .bind(&record.platform)
        .bind(&record.description)
        .bind(&record.ip)
        .bind(&record.elapsed_ms)
        .bind(i32::from(record.status_code))
        .bind(&record.response_msg)
        .bind(&record.response)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            record_id = stored.id,
            method = %stored.method,
            path = %stored.path,
            "Stored audit record"
        );

        Ok(stored)
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.insert(record).await.map(|_| ())
    }
}

/// Count of spawned writes that have not finished yet
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Held by a spawned write; released even if the task is cancelled
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn acquire(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Fire-and-forget handoff of records to an [`AuditSink`]
#[derive(Clone)]
pub struct AsyncPersister {
    sink: Arc<dyn AuditSink>,
    in_flight: Arc<InFlight>,
}

impl AsyncPersister {
    pub fn new(sink: impl AuditSink) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            in_flight: Arc::default(),
        }
    }

    /// Number of writes still running
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every scheduled write has finished
    ///
    /// Returns `false` if writes were still running when `timeout` expired.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let idle = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return self.pending() == 0;
            }
        }
    }

    /// Spawn storage of `record` on its own task
    ///
    /// Returns `None` when called outside a tokio runtime; the record is
    /// dropped with a warning in that case.
    pub fn schedule(&self, record: AuditRecord) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            warn!(
                method = %record.method,
                path = %record.path,
                "No async runtime available, dropping audit record"
            );
            return None;
        };

        let sink = Arc::clone(&self.sink);
        let guard = InFlightGuard::acquire(&self.in_flight);
        let task = handle.spawn(async move {
            let _guard = guard;
            let outcome = AssertUnwindSafe(sink.persist(&record)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    error!(error = %e, record = ?record, "Failed to persist audit record");
                },
                Err(_) => {
                    error!(record = ?record, "Audit sink panicked while persisting record");
                },
            }
        });

        Some(task)
    }
}

impl std::fmt::Debug for AsyncPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPersister")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

//! Audit middleware for mutating API calls
//!
//! For every audited request the layer:
//! - captures query parameters and (small, textual) bodies, restoring the
//!   body for the handler
//! - calls the inner service exactly once
//! - wraps the response body in a tee that keeps a bounded copy
//! - when the body has been sent (or dropped), assembles an
//!   [`AuditRecord`](super::AuditRecord) and hands it to the persister
//!
//! Skipped requests go straight to the inner service untouched.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::header::USER_AGENT,
    response::Response,
};
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::{
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::debug;

use super::capture::{capture_request, normalize_path};
use super::client::{client_ip, platform};
use super::identity::{CallerIdentity, CallerSlot};
use super::persist::{AsyncPersister, PgAuditSink};
use super::policy::AuditPolicy;
use super::record::RecordDraft;
use super::tee::{ResponseTee, TeeBody};

/// Audit layer
///
/// Wraps services to record every mutating call. Cheap to clone; the policy
/// is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct AuditLayer {
    policy: Arc<AuditPolicy>,
    persister: AsyncPersister,
}

impl AuditLayer {
    pub fn new(policy: AuditPolicy, persister: AsyncPersister) -> Self {
        Self {
            policy: Arc::new(policy),
            persister,
        }
    }

    /// Audit layer storing records in PostgreSQL
    pub fn postgres(pool: PgPool, policy: AuditPolicy) -> Self {
        Self::new(policy, AsyncPersister::new(PgAuditSink::new(pool)))
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            policy: Arc::clone(&self.policy),
            persister: self.persister.clone(),
        }
    }
}

/// Audit middleware service
#[derive(Clone, Debug)]
pub struct AuditMiddleware<S> {
    inner: S,
    policy: Arc<AuditPolicy>,
    persister: AsyncPersister,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone may not be ready; keep the instance poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = Arc::clone(&self.policy);
        let persister = self.persister.clone();

        Box::pin(async move {
            let started = Instant::now();
            let method = request.method().clone();
            let resource = normalize_path(request.uri().path(), policy.api_prefix());

            if !policy.should_audit(&method, &resource.path) {
                return inner.call(request).await;
            }

            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let ip = client_ip(request.headers(), peer);
            let platform = platform(
                request
                    .headers()
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default(),
            );
            let caller = request.extensions().get::<CallerIdentity>().cloned();
            let description = policy.describe(&method, &resource.path);

            let (mut request, captured) = capture_request(request, resource, &policy).await;

            let slot = CallerSlot::default();
            request.extensions_mut().insert(slot.clone());

            debug!(
                method = %method,
                path = %captured.path,
                resource_id = ?captured.resource_id,
                ip = %ip,
                "Auditable request received"
            );

            let response = inner.call(request).await?;
            let (parts, body) = response.into_parts();

            let mut tee = ResponseTee::new(policy.max_body_bytes());
            tee.set_status(parts.status);

            let draft = RecordDraft {
                started,
                method,
                captured,
                description,
                ip,
                platform,
                caller,
                slot,
            };

            let body = TeeBody::new(body, tee, move |tee| {
                if tee.is_truncated() {
                    debug!(path = %draft.captured.path, "Audited response copy truncated");
                }
                persister.schedule(draft.complete(tee));
            });

            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

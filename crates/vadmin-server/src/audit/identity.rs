//! Caller identity as seen by the audit layer
//!
//! Authentication is not done here. An auth layer reports who the caller is
//! in one of two ways:
//!
//! - running outside the audit layer, it inserts a [`CallerIdentity`]
//!   request extension before the audit layer sees the request;
//! - running inside it (the usual case for route-level JWT checks), it calls
//!   [`attach_caller`], which also fills the [`CallerSlot`] the audit layer
//!   put on the request.

use std::sync::{Arc, OnceLock};

use axum::http::Request;

/// Authenticated user of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub username: String,
}

impl CallerIdentity {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// Write-once, request-scoped holder for the caller identity
#[derive(Debug, Clone, Default)]
pub struct CallerSlot(Arc<OnceLock<CallerIdentity>>);

impl CallerSlot {
    /// Returns `false` if an identity was already set
    pub fn set(&self, caller: CallerIdentity) -> bool {
        self.0.set(caller).is_ok()
    }

    pub fn get(&self) -> Option<&CallerIdentity> {
        self.0.get()
    }
}

/// Record the authenticated caller on a request
pub fn attach_caller<B>(request: &mut Request<B>, caller: CallerIdentity) {
    if let Some(slot) = request.extensions().get::<CallerSlot>() {
        slot.set(caller.clone());
    }
    request.extensions_mut().insert(caller);
}

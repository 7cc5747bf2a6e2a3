//! API response envelope
//!
//! Every endpoint answers `{"code": .., "msg": .., "data": ..}`. The audit
//! layer reads `msg` and `data` back out of this shape.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success message used when a handler does not set one
pub const DEFAULT_SUCCESS_MSG: &str = "ok";

/// Standard response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new success response
    pub fn success(data: T) -> Self {
        Self::with_msg(data, DEFAULT_SUCCESS_MSG)
    }

    /// Create a success response with a custom message
    pub fn with_msg(data: T, msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            msg: msg.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

//! The `{ ok, data | error }` response envelope shared by every JSON endpoint.
//!
//! Handlers return [`ApiResponse<T>`] on success; [`crate::errors::Error`] renders the failure
//! side through [`ErrorBody`]. Clients can therefore branch on `ok` alone and read `code` for a
//! stable, machine-readable reason.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Successful response wrapper: `{ "ok": true, "data": ... }`.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    status: StatusCode,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK with the given payload.
    pub fn ok(data: T) -> Self {
        Self { status: StatusCode::OK, data }
    }

    /// 201 Created with the given payload.
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessBody<T> {
    pub ok: bool,
    pub data: T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(SuccessBody { ok: true, data: self.data })).into_response()
    }
}

/// Failure body: `{ "ok": false, "error": "...", "code": "..." }`.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            ok: false,
            error: error.into(),
            code: code.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Payload for endpoints that only acknowledge an action.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Ack {
    pub done: bool,
}

impl Ack {
    pub fn done() -> Self {
        Self { done: true }
    }
}

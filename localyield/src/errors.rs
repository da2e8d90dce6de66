use crate::api::envelope::ErrorBody;
use crate::db::errors::DbError;
use crate::types::{Operation, ProductId, Resource};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Operation, resource: Resource },

    /// Account has been suspended by a moderator
    #[error("Account suspended")]
    Suspended,

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// A single input field failed validation
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// No route matches the request path
    #[error("No route for {method} {path}")]
    UnknownRoute { method: String, path: String },

    /// Conflict with current state, e.g. a duplicate review
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Checkout asked for more units than a product has in stock
    #[error("Insufficient stock for {title}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        title: String,
        requested: i32,
        available: i32,
    },

    /// A status change the entity's state machine doesn't allow
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition { entity: String, from: String, to: String },

    /// Fixed-window rate limit exhausted
    #[error("{message}")]
    TooManyRequests { message: String, retry_after: Option<Duration> },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } | Error::Suspended => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::UnknownRoute { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } | Error::InsufficientStock { .. } | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable machine-readable code carried in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "UNAUTHENTICATED",
            Error::InsufficientPermissions { .. } | Error::Suspended => "FORBIDDEN",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Validation { .. } => "VALIDATION_FAILED",
            Error::NotFound { .. } | Error::UnknownRoute { .. } => "NOT_FOUND",
            Error::Conflict { .. } => "CONFLICT",
            Error::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::TooManyRequests { .. } => "RATE_LIMITED",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL",
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "NOT_FOUND",
                DbError::UniqueViolation { .. } => "CONFLICT",
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => "BAD_REQUEST",
                DbError::Other(_) => "INTERNAL",
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::Suspended => "This account has been suspended".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::Validation { field, message } => format!("Invalid {field}: {message}"),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::UnknownRoute { method, path } => format!("No route for {method} {path}"),
            Error::Conflict { message } => message.clone(),
            Error::InsufficientStock {
                title, requested, available, ..
            } => format!("Only {available} of {title} left (requested {requested})"),
            Error::InvalidTransition { entity, from, to } => format!("Cannot move {entity} from {from} to {to}"),
            Error::TooManyRequests { message, .. } => message.clone(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => match (table.as_deref(), constraint.as_deref()) {
                    (Some("users"), Some(c)) if c.contains("email") => "An account with this email address already exists".to_string(),
                    (Some("reviews"), Some("reviews_order_unique")) => "This order has already been reviewed".to_string(),
                    (Some("custom_categories"), _) => "A category with this name already exists".to_string(),
                    (Some("reports"), _) => "You already have an open report for this item".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => Some(serde_json::json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            Error::Validation { field, .. } => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } | Error::Suspended => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::TooManyRequests { .. } => {
                tracing::info!("Rate limited: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut body = ErrorBody::new(self.user_message(), self.code());
        if let Some(details) = self.details() {
            body = body.with_details(details);
        }

        let mut response = (status, Json(body)).into_response();
        if let Error::TooManyRequests {
            retry_after: Some(retry_after),
            ..
        } = &self
        {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let response = Error::NotFound {
            resource: "Product".to_string(),
            id: "abc".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "Product with ID abc not found");
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak() {
        let response = Error::Other(anyhow::anyhow!("connection string postgres://secret")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "INTERNAL");
    }

    #[tokio::test]
    async fn test_insufficient_stock_carries_details() {
        let product_id = uuid::Uuid::new_v4();
        let response = Error::InsufficientStock {
            product_id,
            title: "Duck eggs".to_string(),
            requested: 5,
            available: 2,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");
        assert_eq!(body["details"]["available"], 2);
        assert_eq!(body["details"]["product_id"], product_id.to_string());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = Error::TooManyRequests {
            message: "Slow down".to_string(),
            retry_after: Some(Duration::from_millis(2500)),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[tokio::test]
    async fn test_suspended_is_forbidden() {
        let response = Error::Suspended.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "FORBIDDEN");
        assert_eq!(body["error"], "This account has been suspended");
    }

    #[test]
    fn test_unique_violation_messages() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("reviews_order_unique".to_string()),
            table: Some("reviews".to_string()),
            message: "duplicate key".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "This order has already been reviewed");
    }
}

//! Drop-in replacements for axum's `Json`, `Query` and `Path` extractors.
//!
//! The axum versions reject with plain-text bodies. These wrap them and reject with
//! [`Error`] instead, so malformed input still gets the `{ ok: false, error, code }` envelope.

use crate::errors::Error;
use axum::{
    extract::{
        FromRequest, FromRequestParts, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// JSON request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

/// URL query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

/// Path parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) = axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Query(value))
    }
}

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) = axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Path(value))
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "Rejected request body: {}", rejection.body_text());
        match rejection {
            JsonRejection::JsonDataError(e) => Error::Validation {
                field: "body".to_string(),
                message: e.body_text(),
            },
            JsonRejection::JsonSyntaxError(_) => Error::BadRequest {
                message: "Request body is not valid JSON".to_string(),
            },
            JsonRejection::MissingJsonContentType(_) => Error::BadRequest {
                message: "Expected a request body with Content-Type: application/json".to_string(),
            },
            other => Error::BadRequest { message: other.body_text() },
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation {
            field: "query".to_string(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(e) => Error::Validation {
                field: "path".to_string(),
                message: e.body_text(),
            },
            other => Error::Internal {
                operation: format!("extract path parameters: {}", other.body_text()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        http::StatusCode,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::{Value, json};

    #[derive(Debug, Deserialize)]
    struct Payload {
        quantity: i32,
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        radius: Option<f64>,
    }

    fn server() -> TestServer {
        let router = Router::new()
            .route("/items", post(|Json(payload): Json<Payload>| async move { payload.quantity.to_string() }))
            .route("/items/{id}", get(|Path(id): Path<uuid::Uuid>| async move { id.to_string() }))
            .route("/search", get(|Query(filter): Query<Filter>| async move { format!("{:?}", filter.radius) }));
        TestServer::new(router).unwrap()
    }

    #[tokio::test]
    async fn test_valid_input_passes_through() {
        let server = server();
        assert_eq!(server.post("/items").json(&json!({"quantity": 3})).await.text(), "3");
        assert_eq!(server.get("/search").add_query_param("radius", "2.5").await.text(), "Some(2.5)");
    }

    #[tokio::test]
    async fn test_wrong_field_type_is_validation_failure() {
        let response = server().post("/items").json(&json!({"quantity": "lots"})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "body");
    }

    #[tokio::test]
    async fn test_syntax_error_and_missing_content_type_are_bad_requests() {
        let server = server();

        let response = server
            .post("/items")
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["error"], "Request body is not valid JSON");

        let response = server.post("/items").text(r#"{"quantity": 1}"#).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_bad_query_and_path_are_validation_failures() {
        let server = server();

        let response = server.get("/search").add_query_param("radius", "far").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "query");

        let response = server.get("/items/not-a-uuid").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"]["field"], "path");
    }
}

//! API models for the local development login.

use super::users::{Role, UserResponse};
use super::validation;
use crate::api::envelope::ApiResponse;
use crate::errors::Error;
use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DevLoginRequest {
    pub email: String,
    /// Extra roles granted on login; `buyer` is always held
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl DevLoginRequest {
    /// Lower-cased email and the roles to grant, without duplicates.
    pub fn validate(&self) -> Result<(String, Vec<Role>), Error> {
        let email = validation::email("email", &self.email)?.to_ascii_lowercase();
        let mut roles = self.roles.clone();
        roles.push(Role::Buyer);
        roles.sort();
        roles.dedup();
        Ok((email, roles))
    }
}

/// Envelope plus the `Set-Cookie` header starting or ending a dev session.
pub struct DevSessionResponse<T> {
    pub body: ApiResponse<T>,
    pub cookie: HeaderValue,
}

impl<T: serde::Serialize> IntoResponse for DevSessionResponse<T> {
    fn into_response(self) -> Response {
        let mut response = self.body.into_response();
        response.headers_mut().insert(header::SET_COOKIE, self.cookie);
        response
    }
}

pub type DevLoginResponse = DevSessionResponse<UserResponse>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::envelope::Ack;

    #[test]
    fn test_login_request_normalizes() {
        let request: DevLoginRequest = serde_json::from_value(serde_json::json!({
            "email": "  Farmer@Example.COM ",
            "roles": ["producer", "producer"]
        }))
        .unwrap();
        let (email, roles) = request.validate().unwrap();
        assert_eq!(email, "farmer@example.com");
        assert_eq!(roles, vec![Role::Buyer, Role::Producer]);
    }

    #[test]
    fn test_bad_email_rejected() {
        let request = DevLoginRequest {
            email: "not-an-email".to_string(),
            roles: Vec::new(),
        };
        assert!(matches!(request.validate(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_session_response_sets_cookie() {
        let response = DevSessionResponse {
            body: ApiResponse::ok(Ack::done()),
            cookie: HeaderValue::from_static("ly_dev_user=; Path=/; Max-Age=0"),
        }
        .into_response();
        assert_eq!(response.headers().get(header::SET_COOKIE).unwrap(), "ly_dev_user=; Path=/; Max-Age=0");
    }
}

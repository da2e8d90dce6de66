//! Passwordless login for local development. These routes are only mounted when
//! `auth.dev_stub.enabled` is set.

use crate::{
    AppState,
    api::{
        envelope::{Ack, ApiResponse},
        models::{
            auth::{DevLoginRequest, DevLoginResponse, DevSessionResponse},
            users::{Role, UserResponse},
        },
    },
    auth::{dev_stub, utils::generate_random_display_name},
    db::{
        handlers::{Repository, Users},
        models::users::UserCreateDBRequest,
    },
    errors::{Error, Result},
    rate_limit::{Scope, middleware::client_ip},
    types::abbrev_uuid,
};
use crate::api::extract::Json;
use axum::{
    extract::{ConnectInfo, State},
    http::{Extensions, HeaderMap, HeaderValue},
};
use std::net::SocketAddr;
use tracing::info;

fn cookie_header(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|e| Error::Internal {
        operation: format!("build session cookie: {e}"),
    })
}

#[utoipa::path(
    post,
    path = "/dev/login",
    tag = "dev",
    summary = "Sign in as any email (development only)",
    description = "Creates the account on first use. Listed `roles` are granted on top of the ones already held.",
    request_body = DevLoginRequest,
    responses(
        (status = 200, description = "Signed in; the session cookie is set", body = UserResponse),
        (status = 400, description = "Invalid email"),
        (status = 403, description = "Account suspended"),
        (status = 429, description = "Too many login attempts"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn dev_login(
    State(state): State<AppState>,
    extensions: Extensions,
    headers: HeaderMap,
    Json(request): Json<DevLoginRequest>,
) -> Result<DevLoginResponse> {
    let peer = extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    state.rate_limiter.enforce(Scope::Auth, &client_ip(&headers, peer)).await?;
    let (email, mut roles) = request.validate()?;
    if state.config.is_admin_email(&email) {
        roles.push(Role::Admin);
    }
    let secret = state.config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "dev login without a secret_key".to_string(),
    })?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);
    let user = match users.get_by_email(&email).await? {
        Some(existing) => {
            if existing.is_suspended {
                return Err(Error::Suspended);
            }
            users.add_roles(existing.id, &roles).await?;
            users.get_by_id(existing.id).await?.ok_or_else(|| Error::not_found("User", existing.id))?
        }
        None => {
            let user = users
                .create(&UserCreateDBRequest {
                    external_id: None,
                    email,
                    display_name: Some(generate_random_display_name()),
                    auth_source: "dev-stub".to_string(),
                    roles,
                })
                .await?;
            info!(user_id = %abbrev_uuid(&user.id), "Created dev account");
            user
        }
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let value = dev_stub::sign(user.id, secret).ok_or_else(|| Error::Internal {
        operation: "sign dev session".to_string(),
    })?;
    let cookie = cookie_header(dev_stub::session_cookie(&state.config.auth.dev_stub, &value))?;

    info!(user_id = %abbrev_uuid(&user.id), "Dev login");
    Ok(DevSessionResponse {
        body: ApiResponse::ok(user.into()),
        cookie,
    })
}

#[utoipa::path(
    post,
    path = "/dev/logout",
    tag = "dev",
    summary = "Sign out (development only)",
    responses((status = 200, description = "Session cookie cleared", body = Ack))
)]
#[tracing::instrument(skip_all)]
pub async fn dev_logout(State(state): State<AppState>) -> Result<DevSessionResponse<Ack>> {
    Ok(DevSessionResponse {
        body: ApiResponse::ok(Ack::done()),
        cookie: cookie_header(dev_stub::clear_cookie(&state.config.auth.dev_stub))?,
    })
}

//! Extractors resolving the caller from a Clerk session or a dev-stub cookie.

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    auth::{clerk::ClerkClaims, dev_stub, utils},
    config::Config,
    db::{
        errors::DbError,
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use sqlx::PgPool;
use tracing::{debug, info, instrument, trace, warn};

fn cookie_header(parts: &Parts) -> Option<&str> {
    parts.headers.get(header::COOKIE).and_then(|h| h.to_str().ok())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Find the account for a Clerk subject, linking by email or creating it on first sight.
///
/// A new user's first page load fires several requests at once. When another request wins the
/// insert, the unique violation is resolved by reading back the row it created.
#[instrument(skip(db, config, claims), fields(sub = %claims.sub), err)]
pub async fn provision_clerk_user(db: &PgPool, config: &Config, claims: &ClerkClaims) -> Result<UserDBResponse> {
    match find_or_create_clerk_user(db, config, claims).await {
        Err(Error::Database(DbError::UniqueViolation { constraint, .. })) => {
            debug!(?constraint, "Lost provisioning race, reading back the winner");
            let mut conn = db.acquire().await.map_err(DbError::from)?;
            Users::new(&mut conn)
                .get_by_external_id(&claims.sub)
                .await?
                .ok_or_else(|| Error::Conflict {
                    message: "This email address is already linked to another sign-in".to_string(),
                })
        }
        other => other,
    }
}

async fn find_or_create_clerk_user(db: &PgPool, config: &Config, claims: &ClerkClaims) -> Result<UserDBResponse> {
    let mut tx = db.begin().await.map_err(DbError::from)?;
    let mut users = Users::new(&mut tx);

    if let Some(user) = users.get_by_external_id(&claims.sub).await? {
        return Ok(user);
    }

    let email = claims
        .email
        .as_deref()
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("{}@users.clerk", claims.sub));

    let user = match users.get_by_email(&email).await? {
        Some(existing) if existing.external_id.is_some() => {
            warn!(user_id = %existing.id, "Email already linked to a different Clerk subject");
            return Err(Error::Conflict {
                message: "This email address is already linked to another sign-in".to_string(),
            });
        }
        Some(existing) => {
            users.set_external_id(existing.id, &claims.sub).await?;
            info!(user_id = %existing.id, "Linked existing account to Clerk user");
            users.get_by_id(existing.id).await?.ok_or(DbError::NotFound)?
        }
        None => {
            let mut roles = vec![Role::Buyer];
            if config.is_admin_email(&email) {
                roles.push(Role::Admin);
            }
            let user = users
                .create(&UserCreateDBRequest {
                    external_id: Some(claims.sub.clone()),
                    email,
                    display_name: Some(claims.name.clone().unwrap_or_else(utils::generate_random_display_name)),
                    auth_source: "clerk".to_string(),
                    roles,
                })
                .await?;
            info!(user_id = %user.id, "Provisioned account for new Clerk user");
            user
        }
    };

    tx.commit().await.map_err(DbError::from)?;
    Ok(user)
}

/// Returns:
/// - None: Clerk disabled or no session token present
/// - Some(Ok(user)): token verified and account resolved
/// - Some(Err(error)): token present but invalid, or provisioning failed
async fn try_clerk_auth(parts: &Parts, state: &AppState) -> Option<Result<UserDBResponse>> {
    let verifier = state.clerk.as_ref()?;
    let cookie_name = &state.config.auth.clerk.cookie_name;
    let token = bearer_token(parts).or_else(|| cookie_header(parts).and_then(|h| utils::cookie_value(h, cookie_name)))?;

    let claims = match verifier.verify(token).await {
        Ok(claims) => claims,
        Err(e) => return Some(Err(e)),
    };
    Some(provision_clerk_user(&state.db, &state.config, &claims).await)
}

/// Same contract as [`try_clerk_auth`], for the dev-stub cookie.
async fn try_dev_stub_auth(parts: &Parts, state: &AppState) -> Option<Result<UserDBResponse>> {
    let stub = &state.config.auth.dev_stub;
    if !stub.enabled {
        return None;
    }
    let value = utils::cookie_value(cookie_header(parts)?, &stub.cookie_name)?;
    let secret = state.config.secret_key.as_deref()?;

    let Some(user_id) = dev_stub::verify(value, secret) else {
        return Some(Err(Error::Unauthenticated {
            message: Some("Invalid dev session".to_string()),
        }));
    };

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };
    match Users::new(&mut conn).get_by_id(user_id).await {
        Ok(Some(user)) => Some(Ok(user)),
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("Dev session refers to an unknown user".to_string()),
        })),
        Err(e) => Some(Err(e.into())),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        // Clerk first; a valid dev cookie still works next to a stale Clerk token.
        let mut failure = None;
        let mut resolved = None;

        match try_clerk_auth(parts, state).await {
            Some(Ok(user)) => {
                debug!(user_id = %user.id, "Authenticated with Clerk session");
                resolved = Some(user);
            }
            Some(Err(e)) => {
                trace!(error = %e, "Clerk authentication failed");
                failure = Some(e);
            }
            None => trace!("No Clerk session present"),
        }

        if resolved.is_none() {
            match try_dev_stub_auth(parts, state).await {
                Some(Ok(user)) => {
                    debug!(user_id = %user.id, "Authenticated with dev session");
                    resolved = Some(user);
                }
                Some(Err(e)) => {
                    trace!(error = %e, "Dev session authentication failed");
                    failure = failure.or(Some(e));
                }
                None => trace!("No dev session present"),
            }
        }

        let Some(user) = resolved else {
            return Err(failure.unwrap_or(Error::Unauthenticated { message: None }));
        };

        if user.is_suspended {
            return Err(Error::Suspended);
        }

        let user = CurrentUser::from(user);
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Like [`CurrentUser`], but anonymous callers get `None` instead of a 401.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(Error::Unauthenticated { .. }) => Ok(OptionalUser(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/me");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&parts(&[("authorization", "Bearer abc.def")])), Some("abc.def"));
        assert_eq!(bearer_token(&parts(&[("authorization", "Basic xyz")])), None);
        assert_eq!(bearer_token(&parts(&[("authorization", "Bearer ")])), None);
        assert_eq!(bearer_token(&parts(&[])), None);
    }

    #[test]
    fn test_cookie_header() {
        let p = parts(&[("cookie", "__session=tok; other=1")]);
        assert_eq!(cookie_header(&p).and_then(|h| utils::cookie_value(h, "__session")), Some("tok"));
    }

    fn claims(sub: &str, email: &str) -> ClerkClaims {
        ClerkClaims {
            sub: sub.to_string(),
            iss: "https://clerk.test".to_string(),
            exp: i64::MAX,
            azp: None,
            email: Some(email.to_string()),
            name: Some("Clover Field".to_string()),
        }
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_concurrent_first_requests_share_one_account(pool: PgPool) {
        let config = crate::test_utils::create_test_config();
        let claims = claims("user_2abc", "clover@example.com");

        let (first, second) = tokio::join!(
            provision_clerk_user(&pool, &config, &claims),
            provision_clerk_user(&pool, &config, &claims),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.id, second.id);
        assert_eq!(first.external_id.as_deref(), Some("user_2abc"));
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_email_links_unlinked_account_only(pool: PgPool) {
        let config = crate::test_utils::create_test_config();
        let existing = crate::test_utils::create_test_user(&pool, &[]).await;

        let linked = provision_clerk_user(&pool, &config, &claims("user_first", &existing.email))
            .await
            .unwrap();
        assert_eq!(linked.id, existing.id);
        assert_eq!(linked.external_id.as_deref(), Some("user_first"));

        let err = provision_clerk_user(&pool, &config, &claims("user_second", &existing.email))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let mut conn = pool.acquire().await.unwrap();
        let unchanged = Users::new(&mut conn).get_by_id(existing.id).await.unwrap().unwrap();
        assert_eq!(unchanged.external_id.as_deref(), Some("user_first"));
    }
}

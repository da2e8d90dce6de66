use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::users::{CaregiverProfileResponse, CaregiverProfileUpdate, CurrentUser, ProfileUpdate, PublicProfile, Role, UserResponse},
    },
    db::{
        handlers::{Repository, Users},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};
use crate::api::extract::{Json, Path};
use axum::extract::State;
use tracing::info;

#[utoipa::path(
    get,
    path = "/me",
    tag = "users",
    summary = "Get my account",
    responses(
        (status = 200, description = "The signed-in user", body = UserResponse),
        (status = 401, description = "Not signed in"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_me(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let user = repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::not_found("User", current_user.id))?;
    let profile = repo.get_caregiver_profile(current_user.id).await?;
    Ok(ApiResponse::ok(UserResponse::from(user).with_caregiver_profile(profile)))
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = "users",
    summary = "Update my profile",
    description = "Send an empty string to clear `zip`. `become_producer` grants the producer role.",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "The updated user", body = UserResponse),
        (status = 400, description = "Invalid field"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ProfileUpdate>,
) -> Result<ApiResponse<UserResponse>> {
    let valid = request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut tx);
    if valid.become_producer && !current_user.has_role(Role::Producer) {
        repo.add_roles(current_user.id, &[Role::Producer]).await?;
        info!(user_id = %abbrev_uuid(&current_user.id), "User became a producer");
    }
    let user = repo.update(current_user.id, &UserUpdateDBRequest::from(&valid)).await?;
    let profile = repo.get_caregiver_profile(current_user.id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(ApiResponse::ok(UserResponse::from(user).with_caregiver_profile(profile)))
}

#[utoipa::path(
    put,
    path = "/me/caregiver-profile",
    tag = "users",
    summary = "Offer animal care",
    description = "Creates or replaces the caller's caregiver profile and grants the caregiver role. \
                   Existing bookings keep the rate they were made at.",
    request_body = CaregiverProfileUpdate,
    responses(
        (status = 200, description = "The saved profile", body = CaregiverProfileResponse),
        (status = 400, description = "Invalid field"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn put_caregiver_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CaregiverProfileUpdate>,
) -> Result<ApiResponse<CaregiverProfileResponse>> {
    let profile = request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut tx);
    let saved = repo.upsert_caregiver_profile(current_user.id, &profile).await?;
    repo.add_roles(current_user.id, &[Role::Caregiver]).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(user_id = %abbrev_uuid(&current_user.id), services = saved.services.len(), "Caregiver profile saved");
    Ok(ApiResponse::ok(saved.into()))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Public profile",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user's public profile", body = PublicProfile),
        (status = 404, description = "No such user, or the account is suspended"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_profile(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<ApiResponse<PublicProfile>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let user = repo
        .get_by_id(id)
        .await?
        .filter(|user| !user.is_suspended)
        .ok_or_else(|| Error::not_found("User", id))?;
    let profile = repo.get_caregiver_profile(id).await?;
    Ok(ApiResponse::ok(PublicProfile::from(user).with_caregiver_profile(profile)))
}

//! Admin console: marketplace stats, user management and the report queue.
//!
//! Review moderation lives with the other review handlers.

use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            admin::{AdminStats, AdminUserUpdate, ListUsersQuery},
            orders::OrderStatus,
            pagination::Page,
            reports::{ListReportsQuery, ReportResolution, ReportResponse, ReportStatus, ReportTarget},
            reviews::ReviewStatus,
            users::{CurrentUser, Role, UserResponse},
        },
    },
    auth::permissions::require_admin,
    db::{
        errors::DbError,
        handlers::{CareBookings, Conversations, Orders, Products, Reports, Repository, Reviews, Users, reports::ReportFilter, users::UserFilter},
        models::reports::{ReportDBResponse, ReportResolutionDBRequest},
    },
    errors::{Error, Result},
    types::{ReportId, UserId, abbrev_uuid},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use sqlx::PgConnection;
use tracing::info;

#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "admin",
    summary = "Marketplace counts",
    responses(
        (status = 200, description = "Current counts", body = AdminStats),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_stats(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<AdminStats>> {
    require_admin(&current_user)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let users = Users::new(&mut conn).count(&UserFilter::new(0, 0)).await?;
    let active_listings = Products::new(&mut conn).count_active().await?;

    let mut orders_by_status = OrderStatus::ALL.iter().map(|status| (status.to_string(), 0)).collect::<std::collections::BTreeMap<_, _>>();
    for row in Orders::new(&mut conn).count_by_status().await? {
        orders_by_status.insert(row.status.to_string(), row.count);
    }

    let review_counts = Reviews::new(&mut conn).count_by_status().await?;
    let reviews_with = |status: ReviewStatus| review_counts.iter().filter(|row| row.status == status).map(|row| row.count).sum::<i64>();

    Ok(ApiResponse::ok(AdminStats {
        users,
        active_listings,
        orders_by_status,
        open_reports: Reports::new(&mut conn).count(Some(ReportStatus::Open)).await?,
        flagged_reviews: reviews_with(ReviewStatus::Flagged),
        pending_reviews: reviews_with(ReviewStatus::Pending),
        open_bookings: CareBookings::new(&mut conn).count_open().await?,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "A page of users", body = Page<UserResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<ApiResponse<Page<UserResponse>>> {
    require_admin(&current_user)?;
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let filter = UserFilter::new(query.page.offset(), query.page.page_size()).with_search(search);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    let items = users.into_iter().map(UserResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &query.page)))
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    tag = "admin",
    summary = "Suspend a user or change their roles",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    request_body = AdminUserUpdate,
    responses(
        (status = 200, description = "The updated user", body = UserResponse),
        (status = 400, description = "Nothing to update, or changing your own admin access"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&id)))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    current_user: CurrentUser,
    Json(request): Json<AdminUserUpdate>,
) -> Result<ApiResponse<UserResponse>> {
    require_admin(&current_user)?;
    request.validate()?;

    // An admin locking themselves out leaves nobody to undo it
    if id == current_user.id
        && (request.suspended == Some(true) || request.roles.as_ref().is_some_and(|roles| !roles.contains(&Role::Admin)))
    {
        return Err(Error::BadRequest {
            message: "You cannot suspend yourself or remove your own admin role".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut tx);
    repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("User", id))?;

    if let Some(suspended) = request.suspended {
        repo.set_suspended(id, suspended).await?;
    }
    if let Some(roles) = &request.roles {
        repo.set_roles(id, roles).await?;
    }
    let user = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("User", id))?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(suspended = ?request.suspended, roles = ?request.roles, "User updated by admin");
    Ok(ApiResponse::ok(user.into()))
}

#[utoipa::path(
    get,
    path = "/admin/reports",
    tag = "admin",
    summary = "List reports",
    description = "Oldest first, so the queue is worked in the order it was filed.",
    params(ListReportsQuery),
    responses(
        (status = 200, description = "A page of reports", body = Page<ReportResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_reports(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListReportsQuery>,
) -> Result<ApiResponse<Page<ReportResponse>>> {
    require_admin(&current_user)?;
    let filter = ReportFilter {
        status: query.status,
        skip: query.page.offset(),
        limit: query.page.page_size(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reports::new(&mut conn);
    let reports = repo.list(&filter).await?;
    let total = repo.count(query.status).await?;

    let items = reports.into_iter().map(ReportResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &query.page)))
}

/// Take the reported item out of public view. Returns whether anything changed.
async fn hide_target(conn: &mut PgConnection, report: &ReportDBResponse, note: Option<&str>) -> Result<bool> {
    let id = report.target_id;
    let hidden = match report.target_type {
        ReportTarget::Review => match Reviews::new(conn).moderate(id, ReviewStatus::Hidden, note).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => return Err(e.into()),
        },
        ReportTarget::Product => Products::new(conn).delete(id).await?,
        ReportTarget::User => Users::new(conn).set_suspended(id, true).await?,
        ReportTarget::Message => Conversations::new(conn).hide_message(id).await?,
    };
    Ok(hidden)
}

#[utoipa::path(
    patch,
    path = "/admin/reports/{id}",
    tag = "admin",
    summary = "Resolve or dismiss a report",
    description = "With `hide_target`, a reported review is hidden, a product archived, a user suspended or a message hidden.",
    params(("id" = uuid::Uuid, Path, description = "Report ID")),
    request_body = ReportResolution,
    responses(
        (status = 200, description = "The closed report", body = ReportResponse),
        (status = 400, description = "Invalid resolution"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Report not found"),
        (status = 409, description = "Report is already closed"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(report_id = %abbrev_uuid(&id)))]
pub async fn resolve_report(
    State(state): State<AppState>,
    Path(id): Path<ReportId>,
    current_user: CurrentUser,
    Json(request): Json<ReportResolution>,
) -> Result<ApiResponse<ReportResponse>> {
    require_admin(&current_user)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let report = Reports::new(&mut tx).get_by_id(id).await?.ok_or_else(|| Error::not_found("Report", id))?;
    let resolution_note = request.validate(report.status)?;

    let updated = Reports::new(&mut tx)
        .update(
            id,
            &ReportResolutionDBRequest {
                status: request.status,
                resolution_note: resolution_note.clone(),
                resolved_by: current_user.id,
            },
        )
        .await
        .map_err(|e| match e {
            DbError::NotFound => Error::Conflict {
                message: "This report has already been closed".to_string(),
            },
            other => other.into(),
        })?;

    let target_hidden = if request.hide_target {
        hide_target(&mut tx, &report, resolution_note.as_deref()).await?
    } else {
        false
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(status = %updated.status, target_type = %updated.target_type, target_hidden, "Report closed");
    Ok(ApiResponse::ok(updated.into()))
}

use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            reports::{ReportCreate, ReportResponse},
            users::CurrentUser,
        },
    },
    db::{
        handlers::{Reports, Repository},
        models::reports::ReportCreateDBRequest,
    },
    errors::{Error, Result},
    rate_limit::Scope,
    types::abbrev_uuid,
};
use crate::api::extract::Json;
use axum::extract::State;
use tracing::info;

#[utoipa::path(
    post,
    path = "/reports",
    tag = "reports",
    summary = "Report a product, review, user or message",
    request_body = ReportCreate,
    responses(
        (status = 201, description = "Report filed", body = ReportResponse),
        (status = 400, description = "Reporting yourself, or details too long"),
        (status = 404, description = "Reported item not found"),
        (status = 409, description = "You already have an open report for this item"),
        (status = 429, description = "Too many reports"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ReportCreate>,
) -> Result<ApiResponse<ReportResponse>> {
    state.rate_limiter.enforce(Scope::Reports, &current_user.id.to_string()).await?;
    let details = request.validate(current_user.id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reports::new(&mut conn);
    if !repo.target_exists(request.target_type, request.target_id).await? {
        return Err(Error::not_found(&request.target_type.to_string(), request.target_id));
    }

    let report = repo
        .create(&ReportCreateDBRequest {
            reporter_id: current_user.id,
            target_type: request.target_type,
            target_id: request.target_id,
            reason: request.reason,
            details,
        })
        .await?;

    metrics::counter!("localyield_reports_filed_total").increment(1);
    info!(report_id = %abbrev_uuid(&report.id), target_type = %report.target_type, "Report filed");
    Ok(ApiResponse::created(report.into()))
}

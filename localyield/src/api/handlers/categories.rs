use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            categories::{CategoryDecision, CategoryProposal, CategoryResponse, CategoryStatus, CustomCategoryResponse, ListCustomCategoriesQuery},
            users::{CurrentUser, Role},
        },
    },
    auth::permissions::{require_admin, require_role},
    db::{
        handlers::{Categories, Repository, categories::CategoryFilter},
        models::categories::{CategoryCreateDBRequest, CategoryDecisionDBRequest},
    },
    errors::{Error, Result},
    types::{CategoryId, Operation, Resource},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use tracing::info;

#[utoipa::path(
    get,
    path = "/categories",
    tag = "categories",
    summary = "List selectable categories",
    description = "Built-in categories followed by approved custom ones.",
    responses((status = 200, description = "Categories", body = Vec<CategoryResponse>))
)]
#[tracing::instrument(skip_all)]
pub async fn list_categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<CategoryResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let approved = Categories::new(&mut conn)
        .list(&CategoryFilter {
            status: Some(CategoryStatus::Approved),
            ..Default::default()
        })
        .await?;

    let mut categories = CategoryResponse::builtins();
    categories.extend(approved.into_iter().map(CategoryResponse::from));
    Ok(ApiResponse::ok(categories))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "categories",
    summary = "Propose a custom category",
    request_body = CategoryProposal,
    responses(
        (status = 201, description = "Proposal recorded as pending", body = CustomCategoryResponse),
        (status = 403, description = "Caller is not a producer"),
        (status = 409, description = "Category already exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn propose_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CategoryProposal>,
) -> Result<ApiResponse<CustomCategoryResponse>> {
    require_role(&current_user, Role::Producer, Operation::Create, Resource::Categories)?;
    let (slug, name) = request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut conn)
        .create(&CategoryCreateDBRequest {
            slug,
            name,
            proposed_by: current_user.id,
        })
        .await?;

    info!(slug = %category.slug, "Custom category proposed");
    Ok(ApiResponse::created(category.into()))
}

#[utoipa::path(
    get,
    path = "/admin/categories",
    tag = "admin",
    summary = "List custom categories",
    params(ListCustomCategoriesQuery),
    responses(
        (status = 200, description = "Custom categories", body = Vec<CustomCategoryResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_custom_categories(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListCustomCategoriesQuery>,
) -> Result<ApiResponse<Vec<CustomCategoryResponse>>> {
    require_admin(&current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let categories = Categories::new(&mut conn)
        .list(&CategoryFilter {
            status: query.status,
            ..Default::default()
        })
        .await?;
    Ok(ApiResponse::ok(categories.into_iter().map(CustomCategoryResponse::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/admin/categories/{id}",
    tag = "admin",
    summary = "Approve or reject a custom category",
    params(("id" = uuid::Uuid, Path, description = "Category ID")),
    request_body = CategoryDecision,
    responses(
        (status = 200, description = "Decision recorded", body = CustomCategoryResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn decide_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    current_user: CurrentUser,
    Json(request): Json<CategoryDecision>,
) -> Result<ApiResponse<CustomCategoryResponse>> {
    require_admin(&current_user)?;
    let status = request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut conn)
        .update(
            id,
            &CategoryDecisionDBRequest {
                status,
                decided_by: current_user.id,
            },
        )
        .await
        .map_err(|e| match e {
            crate::db::errors::DbError::NotFound => Error::not_found("Category", id),
            other => other.into(),
        })?;

    info!(slug = %category.slug, status = ?category.status, "Custom category decided");
    Ok(ApiResponse::ok(category.into()))
}

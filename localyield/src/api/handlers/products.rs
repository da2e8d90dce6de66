use crate::{
    AppState,
    api::{
        envelope::{Ack, ApiResponse},
        models::{
            pagination::{Page, PageQuery},
            products::{ProductCreate, ProductResponse, ProductUpdate},
            users::{CurrentUser, Role},
        },
    },
    auth::{
        current_user::OptionalUser,
        permissions::{is_owner_or_admin, require_owner_or_admin, require_role},
    },
    db::{
        handlers::{Categories, Products, Repository, Users, products::ProductFilter},
        models::products::{ProductCreateDBRequest, ProductUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, ProductId, Resource, UserId},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use sqlx::PgConnection;

async fn ensure_selectable_category(conn: &mut PgConnection, slug: &str) -> Result<()> {
    if Categories::new(conn).is_selectable(slug).await? {
        Ok(())
    } else {
        Err(Error::Validation {
            field: "category".to_string(),
            message: format!("'{slug}' is not an available category"),
        })
    }
}

#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    summary = "Create a listing",
    request_body = ProductCreate,
    responses(
        (status = 201, description = "Listing created", body = ProductResponse),
        (status = 400, description = "Invalid fields, unknown category or no ZIP available"),
        (status = 403, description = "Caller is not a producer"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ProductCreate>,
) -> Result<ApiResponse<ProductResponse>> {
    require_role(&current_user, Role::Producer, Operation::Create, Resource::Products)?;
    let valid = request.validate()?;

    let zip = valid.zip.clone().or_else(|| current_user.zip.clone()).ok_or_else(|| Error::Validation {
        field: "zip".to_string(),
        message: "required when your profile has no ZIP code".to_string(),
    })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    ensure_selectable_category(&mut conn, &valid.category).await?;

    let product = Products::new(&mut conn)
        .create(&ProductCreateDBRequest {
            producer_id: current_user.id,
            title: valid.title,
            description: valid.description,
            category: valid.category,
            price: valid.price,
            unit: valid.unit,
            stock: valid.stock,
            zip,
            image_url: valid.image_url,
        })
        .await?;

    metrics::counter!("localyield_products_created_total").increment(1);
    Ok(ApiResponse::created(product.into()))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "products",
    summary = "Get a product",
    params(("id" = uuid::Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product details", body = ProductResponse),
        (status = 404, description = "Not found, or archived and not yours"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    OptionalUser(current_user): OptionalUser,
) -> Result<ApiResponse<ProductResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let product = Products::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Product", id))?;

    let visible = !product.is_archived
        || current_user
            .as_ref()
            .is_some_and(|user| is_owner_or_admin(user, product.producer_id));
    if !visible {
        return Err(Error::not_found("Product", id));
    }
    Ok(ApiResponse::ok(product.into()))
}

#[utoipa::path(
    patch,
    path = "/products/{id}",
    tag = "products",
    summary = "Update a product",
    params(("id" = uuid::Uuid, Path, description = "Product ID")),
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Updated product", body = ProductResponse),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    current_user: CurrentUser,
    Json(request): Json<ProductUpdate>,
) -> Result<ApiResponse<ProductResponse>> {
    let update = request.validate()?;
    if update.is_empty() {
        return Err(Error::BadRequest {
            message: "No fields to update".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let existing = Products::new(&mut tx)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Product", id))?;
    require_owner_or_admin(&current_user, existing.producer_id, Operation::Update, Resource::Products)?;

    if let Some(category) = update.category.as_deref()
        && category != existing.category
    {
        ensure_selectable_category(&mut tx, category).await?;
    }

    let product = Products::new(&mut tx).update(id, &ProductUpdateDBRequest::from(update)).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(ApiResponse::ok(product.into()))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "products",
    summary = "Archive a product",
    description = "Archived products disappear from search but stay referenced by past orders.",
    params(("id" = uuid::Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Archived", body = Ack),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn archive_product(State(state): State<AppState>, Path(id): Path<ProductId>, current_user: CurrentUser) -> Result<ApiResponse<Ack>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Products::new(&mut conn);
    let existing = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("Product", id))?;
    require_owner_or_admin(&current_user, existing.producer_id, Operation::Delete, Resource::Products)?;

    // Already archived is fine
    repo.delete(id).await?;
    Ok(ApiResponse::ok(Ack::done()))
}

#[utoipa::path(
    get,
    path = "/me/products",
    tag = "products",
    summary = "List my products",
    description = "The caller's own products, archived ones included.",
    params(PageQuery),
    responses((status = 200, description = "A page of products", body = Page<ProductResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<ApiResponse<Page<ProductResponse>>> {
    let filter = ProductFilter {
        producer_id: Some(current_user.id),
        include_archived: true,
        skip: page.offset(),
        limit: page.page_size(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Products::new(&mut conn);
    let products = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    let items = products.into_iter().map(ProductResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &page)))
}

/// Active products shown on a producer's public profile.
#[utoipa::path(
    get,
    path = "/users/{id}/products",
    tag = "products",
    summary = "List a producer's active products",
    params(("id" = uuid::Uuid, Path, description = "Producer user ID"), PageQuery),
    responses(
        (status = 200, description = "A page of products", body = Page<ProductResponse>),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_producer_products(
    State(state): State<AppState>,
    Path(producer_id): Path<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<ApiResponse<Page<ProductResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let producer = Users::new(&mut conn).get_by_id(producer_id).await?;
    if producer.is_none_or(|user| user.is_suspended) {
        return Err(Error::not_found("User", producer_id));
    }

    let filter = ProductFilter {
        producer_id: Some(producer_id),
        include_archived: false,
        skip: page.offset(),
        limit: page.page_size(),
    };
    let mut repo = Products::new(&mut conn);
    let products = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    let items = products.into_iter().map(ProductResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &page)))
}

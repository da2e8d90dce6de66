use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            cart::{CartItemUpdate, CartLine, CartResponse},
            users::CurrentUser,
        },
    },
    db::handlers::{Cart, Products, Repository},
    errors::{Error, Result},
    types::{ProductId, UserId},
};
use crate::api::extract::{Json, Path};
use axum::extract::State;
use sqlx::PgConnection;

async fn load_cart(conn: &mut PgConnection, user_id: UserId) -> Result<CartResponse> {
    let lines = Cart::new(conn).lines(user_id).await?;
    Ok(CartResponse::new(lines.into_iter().map(CartLine::from).collect()))
}

#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    summary = "Get my cart",
    description = "Lines are priced at the product's current price. Lines for archived products are marked unavailable.",
    responses((status = 200, description = "The cart", body = CartResponse)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_cart(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<CartResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Ok(ApiResponse::ok(load_cart(&mut conn, current_user.id).await?))
}

#[utoipa::path(
    put,
    path = "/cart/items/{product_id}",
    tag = "cart",
    summary = "Set a cart line",
    params(("product_id" = uuid::Uuid, Path, description = "Product ID")),
    request_body = CartItemUpdate,
    responses(
        (status = 200, description = "The updated cart", body = CartResponse),
        (status = 400, description = "Quantity out of range, or your own product"),
        (status = 404, description = "Product not found or archived"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn put_cart_item(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    current_user: CurrentUser,
    Json(request): Json<CartItemUpdate>,
) -> Result<ApiResponse<CartResponse>> {
    let quantity = request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let product = Products::new(&mut conn)
        .get_by_id(product_id)
        .await?
        .filter(|p| !p.is_archived)
        .ok_or_else(|| Error::not_found("Product", product_id))?;
    if product.producer_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot add your own product to your cart".to_string(),
        });
    }

    Cart::new(&mut conn).upsert(current_user.id, product_id, quantity).await?;
    Ok(ApiResponse::ok(load_cart(&mut conn, current_user.id).await?))
}

#[utoipa::path(
    delete,
    path = "/cart/items/{product_id}",
    tag = "cart",
    summary = "Remove a cart line",
    params(("product_id" = uuid::Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "The updated cart", body = CartResponse),
        (status = 404, description = "Product not in cart"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    current_user: CurrentUser,
) -> Result<ApiResponse<CartResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Cart::new(&mut conn).remove(current_user.id, product_id).await? {
        return Err(Error::not_found("Cart item", product_id));
    }
    Ok(ApiResponse::ok(load_cart(&mut conn, current_user.id).await?))
}

#[utoipa::path(
    delete,
    path = "/cart",
    tag = "cart",
    summary = "Empty my cart",
    responses((status = 200, description = "The empty cart", body = CartResponse)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn clear_cart(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<CartResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Cart::new(&mut conn).clear(current_user.id).await?;
    Ok(ApiResponse::ok(CartResponse::new(Vec::new())))
}

//! Checkout and the order lifecycle.
//!
//! Checkout runs in a single transaction: the products are locked `FOR UPDATE`, every line is
//! checked against the locked rows, stock is decremented and the orders are written before the
//! commit. Any failure rolls the whole thing back, so a rejected checkout leaves stock untouched.

use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            conversations::{ConversationContext, ConversationStarted, message_body},
            orders::{
                CheckoutItem, CheckoutRequest, ListOrdersQuery, OrderActor, OrderIssue, OrderResponse, OrderStatus, OrderStatusUpdate,
                OrderView, authorize_transition, plan_checkout,
            },
            pagination::Page,
            users::CurrentUser,
        },
    },
    db::{
        handlers::{Cart, Conversations, Orders, Products, orders::OrderFilter},
        models::orders::OrderDBResponse,
    },
    errors::{Error, Result},
    rate_limit::Scope,
    types::{Operation, OrderId, ProductId, Resource, abbrev_uuid},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use sqlx::PgConnection;
use tracing::info;

/// Load an order the caller takes part in. Everyone else gets a 404 so ids don't leak.
async fn visible_order(conn: &mut PgConnection, id: OrderId, user: &CurrentUser) -> Result<(OrderDBResponse, OrderActor)> {
    let order = Orders::new(conn).get_by_id(id).await?.ok_or_else(|| Error::not_found("Order", id))?;
    let actor = OrderActor::for_order(&order, user.id, user.is_admin()).ok_or_else(|| Error::not_found("Order", id))?;
    Ok((order, actor))
}

#[utoipa::path(
    post,
    path = "/orders",
    tag = "orders",
    summary = "Check out",
    description = "Buys the given items, or the whole cart when `items` is omitted. Creates one order per producer.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "The created orders", body = Vec<OrderResponse>),
        (status = 400, description = "Empty checkout, invalid quantity or own product"),
        (status = 404, description = "A product is missing or archived"),
        (status = 409, description = "Insufficient stock", body = crate::api::envelope::ErrorBody),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(buyer_id = %abbrev_uuid(&current_user.id)))]
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<ApiResponse<Vec<OrderResponse>>> {
    let note = request.validated_note()?;
    let max_lines = state.config.orders.max_items_per_order;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let from_cart = request.items.is_none();
    let requested = match &request.items {
        Some(items) => items.clone(),
        None => Cart::new(&mut tx)
            .lines(current_user.id)
            .await?
            .into_iter()
            .map(|line| CheckoutItem {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect(),
    };
    let items = CheckoutRequest::validate_items(&requested, max_lines)?;

    let product_ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
    let products = Products::new(&mut tx).lock_for_checkout(&product_ids).await?;
    let planned = plan_checkout(&items, &products, current_user.id)?;

    let mut created = Vec::with_capacity(planned.len());
    for plan in &planned {
        for line in &plan.lines {
            Products::new(&mut tx).adjust_stock(line.product_id, -line.quantity).await?;
        }
        let (order, lines) = Orders::new(&mut tx).create(current_user.id, plan, note.as_deref()).await?;
        created.push(OrderResponse::new(order, lines));
    }

    // Items bought directly are also dropped from the cart if they were there
    let removed = Cart::new(&mut tx).remove_products(current_user.id, &product_ids).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    metrics::counter!("localyield_orders_created_total").increment(created.len() as u64);
    info!(orders = created.len(), lines = items.len(), from_cart, cart_lines_removed = removed, "Checkout completed");
    Ok(ApiResponse::created(created))
}

#[utoipa::path(
    get,
    path = "/orders",
    tag = "orders",
    summary = "List my orders",
    params(ListOrdersQuery),
    responses((status = 200, description = "A page of orders, newest first", body = Page<OrderResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<ApiResponse<Page<OrderResponse>>> {
    let view = query.view.unwrap_or_default();
    let filter = OrderFilter {
        buyer_id: (view == OrderView::Buyer).then_some(current_user.id),
        producer_id: (view == OrderView::Producer).then_some(current_user.id),
        status: query.status,
        skip: query.page.offset(),
        limit: query.page.page_size(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Orders::new(&mut conn);
    let orders = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    let ids: Vec<OrderId> = orders.iter().map(|order| order.id).collect();
    let mut items = repo.items_for(&ids).await?;
    let responses = orders
        .into_iter()
        .map(|order| {
            let lines = items.remove(&order.id).unwrap_or_default();
            OrderResponse::new(order, lines)
        })
        .collect();

    Ok(ApiResponse::ok(Page::new(responses, total, &query.page)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    summary = "Get an order",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "The order with its lines", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_order(State(state): State<AppState>, Path(id): Path<OrderId>, current_user: CurrentUser) -> Result<ApiResponse<OrderResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let (order, _) = visible_order(&mut conn, id, &current_user).await?;
    let items = Orders::new(&mut conn).items(id).await?;
    Ok(ApiResponse::ok(OrderResponse::new(order, items)))
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    tag = "orders",
    summary = "Move an order to a new status",
    description = "Canceling puts the ordered quantities back into stock.",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    request_body = OrderStatusUpdate,
    responses(
        (status = 200, description = "The updated order", body = OrderResponse),
        (status = 403, description = "Caller may not make this change"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed from the current status"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(order_id = %abbrev_uuid(&id)))]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    current_user: CurrentUser,
    Json(request): Json<OrderStatusUpdate>,
) -> Result<ApiResponse<OrderResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let order = Orders::new(&mut tx).lock(id).await?.ok_or_else(|| Error::not_found("Order", id))?;
    let actor = OrderActor::for_order(&order, current_user.id, current_user.is_admin()).ok_or_else(|| Error::not_found("Order", id))?;
    authorize_transition(order.status, request.status, actor)?;

    let mut repo = Orders::new(&mut tx);
    let updated = repo.set_status(id, request.status).await?;
    if request.status == OrderStatus::Canceled {
        let restocked = repo.restock(id).await?;
        info!(products = restocked, "Restocked canceled order");
    }
    let items = repo.items(id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(from = %order.status, to = %updated.status, actor = ?actor, "Order status changed");
    Ok(ApiResponse::ok(OrderResponse::new(updated, items)))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/issues",
    tag = "orders",
    summary = "Raise an issue with the producer",
    description = "Posts a private message in the conversation tied to this order, opening it if needed.",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    request_body = OrderIssue,
    responses(
        (status = 201, description = "Message posted", body = ConversationStarted),
        (status = 400, description = "Order has not been delivered yet"),
        (status = 403, description = "Only the buyer can raise issues"),
        (status = 404, description = "Order not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(order_id = %abbrev_uuid(&id)))]
pub async fn raise_order_issue(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    current_user: CurrentUser,
    Json(request): Json<OrderIssue>,
) -> Result<ApiResponse<ConversationStarted>> {
    state.rate_limiter.enforce(Scope::Messages, &current_user.id.to_string()).await?;
    let body = message_body(&request.message)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let (order, _) = visible_order(&mut tx, id, &current_user).await?;
    if order.buyer_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: Resource::Orders,
        });
    }
    if !order.status.is_delivered() {
        return Err(Error::BadRequest {
            message: format!("Issues can be raised once an order is fulfilled (currently {})", order.status),
        });
    }

    let mut conversations = Conversations::new(&mut tx);
    let conversation = conversations
        .find_or_create(order.buyer_id, order.producer_id, ConversationContext::Order(order.id))
        .await?;
    let message = conversations.post_message(conversation.id, Some(current_user.id), &body).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(conversation_id = %abbrev_uuid(&conversation.id), "Order issue raised");
    Ok(ApiResponse::created(ConversationStarted {
        conversation_id: conversation.id,
        message: message.into(),
    }))
}

//! Reviews, the resolution window for negative ratings, and review moderation.
//!
//! A rating at or below `reviews.negative_rating_threshold` starts out `pending` with a
//! `publish_at` one resolution window away, and a system message invites the buyer and producer
//! to talk it out. Reads that show approved reviews publish anything already due first, so the
//! outcome never depends on when the background publisher last ran.

use crate::{
    AppState,
    api::{
        envelope::{Ack, ApiResponse},
        models::{
            conversations::ConversationContext,
            pagination::{Page, PageQuery},
            reviews::{
                ListReviewsQuery, ModerationRequest, ProducerResponseRequest, ProducerReviewsResponse, ReviewCreate, ReviewEdit,
                ReviewResponse, ReviewStatus, initial_publication, status_after_edit,
            },
            users::CurrentUser,
        },
    },
    auth::permissions::require_admin,
    db::{
        errors::DbError,
        handlers::{Conversations, Orders, Repository, Reviews, Users},
        models::reviews::{ReviewCreateDBRequest, ReviewDBResponse, ReviewEditDBRequest},
    },
    errors::{Error, Result},
    rate_limit::Scope,
    types::{Operation, Resource, ReviewId, UserId, abbrev_uuid},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{debug, info};

fn resolution_notice(rating: i16, publish_at: DateTime<Utc>) -> String {
    format!(
        "A {rating}-star review was left for this order. It will be published on {} unless it is resolved first. \
         Use this conversation to work it out.",
        publish_at.format("%Y-%m-%d %H:%M UTC")
    )
}

/// Publish pending reviews whose window has passed before reading.
async fn publish_due_reviews(conn: &mut PgConnection) -> Result<()> {
    let published = Reviews::new(conn).publish_due(Utc::now()).await?;
    if published > 0 {
        debug!(published, "Published due reviews on read");
    }
    Ok(())
}

/// A review the caller wrote, still open for changes.
async fn own_pending_review(conn: &mut PgConnection, id: ReviewId, user: &CurrentUser) -> Result<ReviewDBResponse> {
    let review = Reviews::new(conn).get_by_id(id).await?.ok_or_else(|| Error::not_found("Review", id))?;
    if review.author_id != user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: Resource::Reviews,
        });
    }
    if review.status != ReviewStatus::Pending {
        return Err(Error::Conflict {
            message: format!("Only pending reviews can be changed (this one is {})", review.status),
        });
    }
    Ok(review)
}

fn pending_changed(e: DbError, id: ReviewId) -> Error {
    match e {
        // Published or moderated between the read and the write
        DbError::NotFound => Error::Conflict {
            message: format!("Review {id} is no longer pending"),
        },
        other => other.into(),
    }
}

#[utoipa::path(
    post,
    path = "/reviews",
    tag = "reviews",
    summary = "Review an order",
    description = "Only the buyer may review, once per order, after it has been fulfilled. \
                   Negative ratings wait out a resolution window before they are published.",
    request_body = ReviewCreate,
    responses(
        (status = 201, description = "Review recorded", body = ReviewResponse),
        (status = 400, description = "Order not yet fulfilled, or invalid rating"),
        (status = 403, description = "Caller is not the buyer"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already reviewed"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_review(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ReviewCreate>,
) -> Result<ApiResponse<ReviewResponse>> {
    state.rate_limiter.enforce(Scope::Reviews, &current_user.id.to_string()).await?;
    let (rating, body) = request.validate()?;
    let order_id = request.order_id;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let order = Orders::new(&mut tx)
        .get_by_id(order_id)
        .await?
        .filter(|order| order.buyer_id == current_user.id || order.producer_id == current_user.id || current_user.is_admin())
        .ok_or_else(|| Error::not_found("Order", order_id))?;
    if order.buyer_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Create,
            resource: Resource::Reviews,
        });
    }
    if !order.status.is_delivered() {
        return Err(Error::BadRequest {
            message: format!("Orders can be reviewed once fulfilled (currently {})", order.status),
        });
    }
    if Reviews::new(&mut tx).get_by_order(order_id).await?.is_some() {
        return Err(Error::Conflict {
            message: "This order has already been reviewed".to_string(),
        });
    }

    let reviews_config = &state.config.reviews;
    let (status, publish_at) = initial_publication(rating, reviews_config.negative_rating_threshold, reviews_config.resolution_window, Utc::now());

    let review = Reviews::new(&mut tx)
        .create(&ReviewCreateDBRequest {
            order_id,
            author_id: current_user.id,
            producer_id: order.producer_id,
            rating,
            body,
            status,
            publish_at,
        })
        .await?;

    if let Some(publish_at) = publish_at {
        let mut conversations = Conversations::new(&mut tx);
        let conversation = conversations
            .find_or_create(order.buyer_id, order.producer_id, ConversationContext::Order(order.id))
            .await?;
        conversations.post_message(conversation.id, None, &resolution_notice(rating, publish_at)).await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    metrics::counter!("localyield_reviews_created_total", "status" => status.as_str()).increment(1);
    info!(review_id = %abbrev_uuid(&review.id), rating, status = %status, "Review created");
    Ok(ApiResponse::created(ReviewResponse::from(review).public()))
}

#[utoipa::path(
    patch,
    path = "/reviews/{id}",
    tag = "reviews",
    summary = "Edit a pending review",
    description = "Raising the rating above the negative threshold publishes the review immediately.",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    request_body = ReviewEdit,
    responses(
        (status = 200, description = "Updated review", body = ReviewResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is no longer pending"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn edit_review(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    current_user: CurrentUser,
    Json(request): Json<ReviewEdit>,
) -> Result<ApiResponse<ReviewResponse>> {
    let (rating, body) = request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    publish_due_reviews(&mut conn).await?;
    let review = own_pending_review(&mut conn, id, &current_user).await?;

    let rating = rating.unwrap_or(review.rating);
    let (status, publish_at) = status_after_edit(&review, rating, state.config.reviews.negative_rating_threshold);
    let updated = Reviews::new(&mut conn)
        .edit_pending(
            id,
            &ReviewEditDBRequest {
                rating,
                body: body.unwrap_or_else(|| review.body.clone()),
                status,
                publish_at,
            },
        )
        .await
        .map_err(|e| pending_changed(e, id))?;

    info!(review_id = %abbrev_uuid(&id), rating, status = %updated.status, "Pending review edited");
    Ok(ApiResponse::ok(ReviewResponse::from(updated).public()))
}

#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    summary = "Withdraw a pending review",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review withdrawn", body = Ack),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is no longer pending"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn withdraw_review(State(state): State<AppState>, Path(id): Path<ReviewId>, current_user: CurrentUser) -> Result<ApiResponse<Ack>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    publish_due_reviews(&mut conn).await?;
    own_pending_review(&mut conn, id, &current_user).await?;

    if !Reviews::new(&mut conn).delete_pending(id).await? {
        return Err(pending_changed(DbError::NotFound, id));
    }
    info!(review_id = %abbrev_uuid(&id), "Pending review withdrawn");
    Ok(ApiResponse::ok(Ack::done()))
}

#[utoipa::path(
    put,
    path = "/reviews/{id}/response",
    tag = "reviews",
    summary = "Respond to a review",
    description = "The reviewed producer's public reply. Replaces any earlier response.",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    request_body = ProducerResponseRequest,
    responses(
        (status = 200, description = "Review with the response", body = ReviewResponse),
        (status = 403, description = "Not the reviewed producer"),
        (status = 404, description = "Review not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn respond_to_review(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    current_user: CurrentUser,
    Json(request): Json<ProducerResponseRequest>,
) -> Result<ApiResponse<ReviewResponse>> {
    let response = request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reviews::new(&mut conn);
    let review = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("Review", id))?;
    if review.producer_id != current_user.id {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: Resource::Reviews,
        });
    }

    let updated = repo.set_response(id, &response).await?;
    Ok(ApiResponse::ok(ReviewResponse::from(updated).public()))
}

#[utoipa::path(
    get,
    path = "/producers/{id}/reviews",
    tag = "reviews",
    summary = "Published reviews of a producer",
    params(("id" = uuid::Uuid, Path, description = "Producer user ID"), PageQuery),
    responses(
        (status = 200, description = "Approved reviews with the average rating", body = ProducerReviewsResponse),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_producer_reviews(
    State(state): State<AppState>,
    Path(producer_id): Path<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<ApiResponse<ProducerReviewsResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).get_by_id(producer_id).await?.is_none() {
        return Err(Error::not_found("User", producer_id));
    }
    publish_due_reviews(&mut conn).await?;

    let mut repo = Reviews::new(&mut conn);
    let summary = repo.summary_for_producer(producer_id).await?;
    let items = repo.list_approved_for_producer(producer_id, page.offset(), page.page_size()).await?;
    Ok(ApiResponse::ok(ProducerReviewsResponse::new(summary, items, &page)))
}

#[utoipa::path(
    get,
    path = "/me/reviews",
    tag = "reviews",
    summary = "Reviews I wrote or received",
    description = "Every status, including pending reviews still inside their resolution window.",
    responses((status = 200, description = "Reviews, newest first", body = Vec<ReviewResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_reviews(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<Vec<ReviewResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    publish_due_reviews(&mut conn).await?;

    let reviews = Reviews::new(&mut conn).list_involving(current_user.id).await?;
    Ok(ApiResponse::ok(
        reviews.into_iter().map(|review| ReviewResponse::from(review).public()).collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/reviews",
    tag = "admin",
    summary = "List reviews for moderation",
    params(ListReviewsQuery),
    responses(
        (status = 200, description = "A page of reviews", body = Page<ReviewResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_reviews_for_moderation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListReviewsQuery>,
) -> Result<ApiResponse<Page<ReviewResponse>>> {
    require_admin(&current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    publish_due_reviews(&mut conn).await?;

    let mut repo = Reviews::new(&mut conn);
    let reviews = repo.list_by_status(query.status, query.page.offset(), query.page.page_size()).await?;
    let total: i64 = repo
        .count_by_status()
        .await?
        .into_iter()
        .filter(|row| query.status.is_none_or(|status| status == row.status))
        .map(|row| row.count)
        .sum();

    let items = reviews.into_iter().map(ReviewResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &query.page)))
}

#[utoipa::path(
    patch,
    path = "/admin/reviews/{id}",
    tag = "admin",
    summary = "Moderate a review",
    params(("id" = uuid::Uuid, Path, description = "Review ID")),
    request_body = ModerationRequest,
    responses(
        (status = 200, description = "Moderated review", body = ReviewResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Status change not allowed"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn moderate_review(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    current_user: CurrentUser,
    Json(request): Json<ModerationRequest>,
) -> Result<ApiResponse<ReviewResponse>> {
    require_admin(&current_user)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reviews::new(&mut conn);
    let review = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("Review", id))?;
    let note = request.validate(review.status)?;

    let updated = repo.moderate(id, request.status, note.as_deref()).await?;
    info!(review_id = %abbrev_uuid(&id), from = %review.status, to = %updated.status, "Review moderated");
    Ok(ApiResponse::ok(updated.into()))
}

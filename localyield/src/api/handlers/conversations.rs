//! Direct messaging between two users, optionally about a product, order or booking.
//!
//! Clients poll `GET /conversations/{id}/messages?after=<last seen id>` for new messages. Anyone
//! who isn't one of the two participants gets a 404.

use crate::{
    AppState,
    api::{
        envelope::{Ack, ApiResponse},
        models::{
            conversations::{
                ConversationContext, ConversationResponse, ConversationStart, ConversationStarted, MessagePost, MessageResponse,
                MessagesQuery, message_body,
            },
            users::CurrentUser,
        },
    },
    db::{
        handlers::{CareBookings, Conversations, Orders, Products, Repository, Users},
        models::conversations::ConversationDBResponse,
    },
    errors::{Error, Result},
    rate_limit::Scope,
    types::{ConversationId, UserId, abbrev_uuid},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use sqlx::PgConnection;
use tracing::info;

/// The context record must exist and concern both participants.
async fn check_context(conn: &mut PgConnection, context: ConversationContext, a: UserId, b: UserId) -> Result<()> {
    let same_pair = |x: UserId, y: UserId| (x == a && y == b) || (x == b && y == a);
    match context {
        ConversationContext::General => Ok(()),
        ConversationContext::Product(id) => {
            let product = Products::new(conn).get_by_id(id).await?.ok_or_else(|| Error::not_found("Product", id))?;
            if product.producer_id == a || product.producer_id == b {
                Ok(())
            } else {
                Err(Error::BadRequest {
                    message: "A product conversation must include the product's producer".to_string(),
                })
            }
        }
        ConversationContext::Order(id) => Orders::new(conn)
            .get_by_id(id)
            .await?
            .filter(|order| same_pair(order.buyer_id, order.producer_id))
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Order", id)),
        ConversationContext::Booking(id) => CareBookings::new(conn)
            .get_by_id(id)
            .await?
            .filter(|booking| same_pair(booking.owner_id, booking.caregiver_id))
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Booking", id)),
    }
}

async fn participant_conversation(conn: &mut PgConnection, id: ConversationId, user: &CurrentUser) -> Result<ConversationDBResponse> {
    Conversations::new(conn)
        .get_by_id(id)
        .await?
        .filter(|conversation| conversation.has_participant(user.id))
        .ok_or_else(|| Error::not_found("Conversation", id))
}

#[utoipa::path(
    post,
    path = "/conversations",
    tag = "messages",
    summary = "Message a user",
    description = "Continues the existing conversation for this pair and context, or opens a new one.",
    request_body = ConversationStart,
    responses(
        (status = 201, description = "Message posted", body = ConversationStarted),
        (status = 400, description = "Messaging yourself, several contexts, or an empty body"),
        (status = 404, description = "Recipient or context not found"),
        (status = 429, description = "Too many messages"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn start_conversation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ConversationStart>,
) -> Result<ApiResponse<ConversationStarted>> {
    state.rate_limiter.enforce(Scope::Messages, &current_user.id.to_string()).await?;
    let (context, body) = request.validate(current_user.id)?;
    let recipient_id = request.recipient_id;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut tx)
        .get_by_id(recipient_id)
        .await?
        .filter(|user| !user.is_suspended)
        .ok_or_else(|| Error::not_found("User", recipient_id))?;
    check_context(&mut tx, context, current_user.id, recipient_id).await?;

    let mut conversations = Conversations::new(&mut tx);
    let conversation = conversations.find_or_create(current_user.id, recipient_id, context).await?;
    let message = conversations.post_message(conversation.id, Some(current_user.id), &body).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    metrics::counter!("localyield_messages_sent_total").increment(1);
    info!(conversation_id = %abbrev_uuid(&conversation.id), "Message sent");
    Ok(ApiResponse::created(ConversationStarted {
        conversation_id: conversation.id,
        message: message.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/conversations",
    tag = "messages",
    summary = "List my conversations",
    responses((status = 200, description = "Conversations with the latest activity first", body = Vec<ConversationResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_conversations(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<Vec<ConversationResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let conversations = Conversations::new(&mut conn).list_for_user(current_user.id).await?;
    Ok(ApiResponse::ok(conversations.into_iter().map(ConversationResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    tag = "messages",
    summary = "Read messages",
    description = "Oldest first. Pass the last message ID you have as `after` to poll for new ones.",
    params(("id" = uuid::Uuid, Path, description = "Conversation ID"), MessagesQuery),
    responses(
        (status = 200, description = "Messages", body = Vec<MessageResponse>),
        (status = 404, description = "Conversation not found, or `after` is not one of its messages"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    current_user: CurrentUser,
    Query(query): Query<MessagesQuery>,
) -> Result<ApiResponse<Vec<MessageResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    participant_conversation(&mut conn, id, &current_user).await?;

    let mut repo = Conversations::new(&mut conn);
    let after_seq = match query.after {
        Some(after) => Some(repo.message_seq(id, after).await?.ok_or_else(|| Error::not_found("Message", after))?),
        None => None,
    };
    let messages = repo.messages(id, after_seq, query.limit()).await?;
    Ok(ApiResponse::ok(messages.into_iter().map(MessageResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    tag = "messages",
    summary = "Send a message",
    params(("id" = uuid::Uuid, Path, description = "Conversation ID")),
    request_body = MessagePost,
    responses(
        (status = 201, description = "Message posted", body = MessageResponse),
        (status = 404, description = "Conversation not found"),
        (status = 429, description = "Too many messages"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    current_user: CurrentUser,
    Json(request): Json<MessagePost>,
) -> Result<ApiResponse<MessageResponse>> {
    state.rate_limiter.enforce(Scope::Messages, &current_user.id.to_string()).await?;
    let body = message_body(&request.body)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    participant_conversation(&mut conn, id, &current_user).await?;
    let message = Conversations::new(&mut conn).post_message(id, Some(current_user.id), &body).await?;

    metrics::counter!("localyield_messages_sent_total").increment(1);
    Ok(ApiResponse::created(message.into()))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/read",
    tag = "messages",
    summary = "Mark a conversation read",
    params(("id" = uuid::Uuid, Path, description = "Conversation ID")),
    responses(
        (status = 200, description = "Marked read", body = Ack),
        (status = 404, description = "Conversation not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_conversation_read(State(state): State<AppState>, Path(id): Path<ConversationId>, current_user: CurrentUser) -> Result<ApiResponse<Ack>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Conversations::new(&mut conn).mark_read(id, current_user.id).await? {
        return Err(Error::not_found("Conversation", id));
    }
    Ok(ApiResponse::ok(Ack::done()))
}

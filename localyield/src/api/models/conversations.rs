//! API models for direct messaging.
//!
//! A conversation joins two distinct users, optionally around one product, order or booking. The
//! pair plus context is unique, so "starting" a conversation that already exists continues it.

use super::validation;
use crate::db::models::conversations::{ConversationSummaryDBResponse, MessageDBResponse};
use crate::errors::Error;
use crate::types::{BookingId, ConversationId, MessageId, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

pub const MAX_MESSAGE_LEN: usize = 4000;
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;
pub const MAX_MESSAGE_LIMIT: i64 = 100;

/// What a conversation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationContext {
    #[default]
    General,
    Product(ProductId),
    Order(OrderId),
    Booking(BookingId),
}

impl ConversationContext {
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            ConversationContext::Product(id) => Some(*id),
            _ => None,
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            ConversationContext::Order(id) => Some(*id),
            _ => None,
        }
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        match self {
            ConversationContext::Booking(id) => Some(*id),
            _ => None,
        }
    }
}

/// Participants in the order the table stores them.
pub fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub fn message_body(body: &str) -> Result<String, Error> {
    validation::text("body", body, 1, MAX_MESSAGE_LEN)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConversationStart {
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    pub body: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub product_id: Option<ProductId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub order_id: Option<OrderId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub booking_id: Option<BookingId>,
}

impl ConversationStart {
    pub fn validate(&self, sender_id: UserId) -> Result<(ConversationContext, String), Error> {
        if self.recipient_id == sender_id {
            return Err(Error::BadRequest {
                message: "You cannot message yourself".to_string(),
            });
        }
        let context = match (self.product_id, self.order_id, self.booking_id) {
            (None, None, None) => ConversationContext::General,
            (Some(id), None, None) => ConversationContext::Product(id),
            (None, Some(id), None) => ConversationContext::Order(id),
            (None, None, Some(id)) => ConversationContext::Booking(id),
            _ => return Err(validation::invalid("context", "give at most one of product_id, order_id, booking_id")),
        };
        Ok((context, message_body(&self.body)?))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MessagePost {
    pub body: String,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct MessagesQuery {
    /// Only messages posted after this one
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub after: Option<MessageId>,
    /// Maximum messages to return (default 50, max 100)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl MessagesQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, MAX_MESSAGE_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = String, format = "uuid")]
    pub conversation_id: ConversationId,
    /// `null` for system notices
    #[schema(value_type = Option<String>, format = "uuid")]
    pub sender_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageDBResponse> for MessageResponse {
    fn from(db: MessageDBResponse) -> Self {
        Self {
            id: db.id,
            conversation_id: db.conversation_id,
            sender_id: db.sender_id,
            body: db.body,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LastMessage {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub sender_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ConversationId,
    #[schema(value_type = String, format = "uuid")]
    pub other_user_id: UserId,
    pub other_user_name: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub product_id: Option<ProductId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub order_id: Option<OrderId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub booking_id: Option<BookingId>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    pub last_message_at: DateTime<Utc>,
}

impl From<ConversationSummaryDBResponse> for ConversationResponse {
    fn from(db: ConversationSummaryDBResponse) -> Self {
        let last_message = match (db.last_message_id, db.last_message_body, db.last_message_created_at) {
            (Some(id), Some(body), Some(created_at)) => Some(LastMessage {
                id,
                sender_id: db.last_message_sender_id,
                body,
                created_at,
            }),
            _ => None,
        };
        Self {
            id: db.id,
            other_user_id: db.other_user_id,
            other_user_name: db.other_user_name,
            product_id: db.product_id,
            order_id: db.order_id,
            booking_id: db.booking_id,
            last_message,
            unread_count: db.unread_count,
            last_message_at: db.last_message_at,
        }
    }
}

/// Returned when a conversation is started or continued.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationStarted {
    #[schema(value_type = String, format = "uuid")]
    pub conversation_id: ConversationId,
    pub message: MessageResponse,
}

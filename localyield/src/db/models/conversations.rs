//! Database models for conversations and messages.

use crate::types::{BookingId, ConversationId, MessageId, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationDBResponse {
    pub id: ConversationId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub booking_id: Option<BookingId>,
    pub a_last_read_at: Option<DateTime<Utc>>,
    pub b_last_read_at: Option<DateTime<Utc>>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ConversationDBResponse {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }
}

/// A conversation as seen by one participant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationSummaryDBResponse {
    pub id: ConversationId,
    pub other_user_id: UserId,
    pub other_user_name: Option<String>,
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub booking_id: Option<BookingId>,
    pub last_message_id: Option<MessageId>,
    pub last_message_sender_id: Option<UserId>,
    pub last_message_body: Option<String>,
    pub last_message_created_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageDBResponse {
    pub id: MessageId,
    pub seq: i64,
    pub conversation_id: ConversationId,
    pub sender_id: Option<UserId>,
    pub body: String,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
}

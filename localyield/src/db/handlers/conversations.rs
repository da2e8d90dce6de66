//! Database repository for conversations and their messages.

use crate::api::models::conversations::{ConversationContext, ordered_pair};
use crate::db::{
    errors::{DbError, Result},
    models::conversations::{ConversationDBResponse, ConversationSummaryDBResponse, MessageDBResponse},
};
use crate::types::{ConversationId, MessageId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str =
    "id, participant_a, participant_b, product_id, order_id, booking_id, a_last_read_at, b_last_read_at, last_message_at, created_at";
const MESSAGE_COLUMNS: &str = "id, seq, conversation_id, sender_id, body, is_hidden, created_at";

pub struct Conversations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Conversations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Return the conversation for this pair and context, creating it if needed.
    #[instrument(skip(self), fields(a = %abbrev_uuid(&a), b = %abbrev_uuid(&b)), err)]
    pub async fn find_or_create(&mut self, a: UserId, b: UserId, context: ConversationContext) -> Result<ConversationDBResponse> {
        let (participant_a, participant_b) = ordered_pair(a, b);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, product_id, order_id, booking_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(participant_a)
        .bind(participant_b)
        .bind(context.product_id())
        .bind(context.order_id())
        .bind(context.booking_id())
        .execute(&mut *self.db)
        .await?;

        sqlx::query_as::<_, ConversationDBResponse>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE participant_a = $1 AND participant_b = $2
              AND product_id IS NOT DISTINCT FROM $3
              AND order_id IS NOT DISTINCT FROM $4
              AND booking_id IS NOT DISTINCT FROM $5
            "#
        ))
        .bind(participant_a)
        .bind(participant_b)
        .bind(context.product_id())
        .bind(context.order_id())
        .bind(context.booking_id())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: ConversationId) -> Result<Option<ConversationDBResponse>> {
        let conversation = sqlx::query_as::<_, ConversationDBResponse>(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(conversation)
    }

    /// The caller's conversations, most recent activity first.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<ConversationSummaryDBResponse>> {
        let conversations = sqlx::query_as::<_, ConversationSummaryDBResponse>(
            r#"
            SELECT c.id,
                   other.id AS other_user_id,
                   other.display_name AS other_user_name,
                   c.product_id, c.order_id, c.booking_id,
                   lm.id AS last_message_id,
                   lm.sender_id AS last_message_sender_id,
                   lm.body AS last_message_body,
                   lm.created_at AS last_message_created_at,
                   (
                       SELECT COUNT(*) FROM messages m
                       WHERE m.conversation_id = c.id
                         AND NOT m.is_hidden
                         AND m.sender_id IS DISTINCT FROM $1
                         AND m.created_at > COALESCE(
                             CASE WHEN c.participant_a = $1 THEN c.a_last_read_at ELSE c.b_last_read_at END,
                             '-infinity'::timestamptz
                         )
                   ) AS unread_count,
                   c.last_message_at
            FROM conversations c
            JOIN users other ON other.id = CASE WHEN c.participant_a = $1 THEN c.participant_b ELSE c.participant_a END
            LEFT JOIN LATERAL (
                SELECT id, sender_id, body, created_at FROM messages
                WHERE conversation_id = c.id AND NOT is_hidden
                ORDER BY seq DESC LIMIT 1
            ) lm ON TRUE
            WHERE c.participant_a = $1 OR c.participant_b = $1
            ORDER BY c.last_message_at DESC, c.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(conversations)
    }

    /// Post a message; `sender_id` is `None` for system notices.
    #[instrument(skip(self, body), fields(conversation_id = %abbrev_uuid(&conversation_id), system = sender_id.is_none()), err)]
    pub async fn post_message(&mut self, conversation_id: ConversationId, sender_id: Option<UserId>, body: &str) -> Result<MessageDBResponse> {
        let message = sqlx::query_as::<_, MessageDBResponse>(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, body) VALUES ($1, $2, $3, $4) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&mut *self.db)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(message.created_at)
            .execute(&mut *self.db)
            .await?;

        Ok(message)
    }

    /// Position of `message_id` within the conversation, `None` if it belongs elsewhere.
    #[instrument(skip(self), err)]
    pub async fn message_seq(&mut self, conversation_id: ConversationId, message_id: MessageId) -> Result<Option<i64>> {
        let seq: Option<i64> = sqlx::query_scalar("SELECT seq FROM messages WHERE id = $1 AND conversation_id = $2")
            .bind(message_id)
            .bind(conversation_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(seq)
    }

    /// Visible messages after `after_seq`, oldest first.
    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&conversation_id)), err)]
    pub async fn messages(&mut self, conversation_id: ConversationId, after_seq: Option<i64>, limit: i64) -> Result<Vec<MessageDBResponse>> {
        let messages = sqlx::query_as::<_, MessageDBResponse>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = $1 AND NOT is_hidden AND seq > $2
             ORDER BY seq
             LIMIT $3"
        ))
        .bind(conversation_id)
        .bind(after_seq.unwrap_or(0))
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(messages)
    }

    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&conversation_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn mark_read(&mut self, conversation_id: ConversationId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                a_last_read_at = CASE WHEN participant_a = $2 THEN NOW() ELSE a_last_read_at END,
                b_last_read_at = CASE WHEN participant_b = $2 THEN NOW() ELSE b_last_read_at END
            WHERE id = $1 AND (participant_a = $2 OR participant_b = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(message_id = %abbrev_uuid(&id)), err)]
    pub async fn get_message(&mut self, id: MessageId) -> Result<Option<MessageDBResponse>> {
        let message = sqlx::query_as::<_, MessageDBResponse>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(message)
    }

    #[instrument(skip(self), fields(message_id = %abbrev_uuid(&id)), err)]
    pub async fn hide_message(&mut self, id: MessageId) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET is_hidden = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_find_or_create_reuses_pair_and_context(pool: PgPool) {
        let alice = create_test_user(&pool, &[Role::Buyer]).await;
        let bob = create_test_user(&pool, &[Role::Producer]).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Conversations::new(&mut conn);
        let first = repo.find_or_create(alice.id, bob.id, ConversationContext::General).await.unwrap();
        let again = repo.find_or_create(bob.id, alice.id, ConversationContext::General).await.unwrap();
        assert_eq!(first.id, again.id);

        let missing_booking = repo
            .find_or_create(alice.id, bob.id, ConversationContext::Booking(Uuid::new_v4()))
            .await;
        assert!(missing_booking.is_err());
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_unread_counts_and_polling(pool: PgPool) {
        let alice = create_test_user(&pool, &[Role::Buyer]).await;
        let bob = create_test_user(&pool, &[Role::Producer]).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Conversations::new(&mut conn);
        let conversation = repo.find_or_create(alice.id, bob.id, ConversationContext::General).await.unwrap();
        let first = repo.post_message(conversation.id, Some(alice.id), "Hi! Any honey left?").await.unwrap();
        repo.post_message(conversation.id, Some(bob.id), "Two jars").await.unwrap();
        repo.post_message(conversation.id, None, "System notice").await.unwrap();

        let for_alice = repo.list_for_user(alice.id).await.unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].other_user_id, bob.id);
        assert_eq!(for_alice[0].unread_count, 2);
        assert_eq!(for_alice[0].last_message_body.as_deref(), Some("System notice"));

        let seq = repo.message_seq(conversation.id, first.id).await.unwrap();
        let newer = repo.messages(conversation.id, seq, 50).await.unwrap();
        assert_eq!(newer.len(), 2);

        assert!(repo.hide_message(first.id).await.unwrap());
        assert_eq!(repo.messages(conversation.id, None, 50).await.unwrap().len(), 2);
        assert!(!repo.mark_read(conversation.id, Uuid::new_v4()).await.unwrap());
    }
}

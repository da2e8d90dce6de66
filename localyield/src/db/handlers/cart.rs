//! Database repository for cart lines.

use crate::db::{errors::Result, models::cart::CartLineDBResponse};
use crate::types::{ProductId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Cart<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Cart<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn lines(&mut self, user_id: UserId) -> Result<Vec<CartLineDBResponse>> {
        let lines = sqlx::query_as::<_, CartLineDBResponse>(
            r#"
            SELECT c.product_id, p.producer_id, p.title, p.unit, p.price, c.quantity, p.stock, p.is_archived, c.added_at
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.added_at, c.product_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(lines)
    }

    /// Set the quantity of a line, adding it if absent.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), product_id = %abbrev_uuid(&product_id)), err)]
    pub async fn upsert(&mut self, user_id: UserId, product_id: ProductId, quantity: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), product_id = %abbrev_uuid(&product_id)), err)]
    pub async fn remove(&mut self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the lines for `product_ids`, e.g. after they were checked out.
    #[instrument(skip(self, product_ids), fields(user_id = %abbrev_uuid(&user_id), count = product_ids.len()), err)]
    pub async fn remove_products(&mut self, user_id: UserId, product_ids: &[ProductId]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = ANY($2)")
            .bind(user_id)
            .bind(product_ids)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn clear(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

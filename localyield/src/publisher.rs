//! Background sweep that publishes negative reviews once their resolution window has passed.
//!
//! Reads also publish due reviews on the spot, so this only bounds how long a due review can sit
//! unpublished when nobody is looking at the producer's page.

use crate::db::handlers::Reviews;
use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct ReviewPublisher {
    pool: PgPool,
    interval: Duration,
}

impl ReviewPublisher {
    pub fn new(pool: PgPool, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Publish everything due now. Returns how many reviews went public.
    pub async fn sweep(&self) -> anyhow::Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let published = Reviews::new(&mut conn).publish_due(Utc::now()).await?;
        Ok(published)
    }

    /// Sweep on every tick until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "Starting review publisher");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Review publisher stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => debug!("No reviews due"),
                        Ok(published) => {
                            metrics::counter!("localyield_reviews_auto_published_total").increment(published);
                            info!(published, "Published reviews past their resolution window");
                        }
                        Err(e) => error!(error = %e, "Review publish sweep failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::reviews::ReviewStatus;
    use crate::api::models::users::Role;
    use crate::db::models::reviews::ReviewCreateDBRequest;
    use crate::test_utils::{create_test_order, create_test_user};

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/unused")
            .unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        // Returns immediately even though the first sweep could never connect
        tokio::time::timeout(Duration::from_secs(5), ReviewPublisher::new(pool, Duration::from_secs(3600)).run(shutdown))
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_sweep_publishes_only_due_reviews(pool: PgPool) {
        let buyer = create_test_user(&pool, &[Role::Buyer]).await;
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let due_order = create_test_order(&pool, buyer.id, producer.id).await;
        let later_order = create_test_order(&pool, buyer.id, producer.id).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reviews::new(&mut conn);
        let due = repo
            .create(&ReviewCreateDBRequest {
                order_id: due_order.id,
                author_id: buyer.id,
                producer_id: producer.id,
                rating: 1,
                body: "Eggs arrived cracked".to_string(),
                status: ReviewStatus::Pending,
                publish_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            })
            .await
            .unwrap();
        let later = repo
            .create(&ReviewCreateDBRequest {
                order_id: later_order.id,
                author_id: buyer.id,
                producer_id: producer.id,
                rating: 2,
                body: String::new(),
                status: ReviewStatus::Pending,
                publish_at: Some(Utc::now() + chrono::Duration::hours(72)),
            })
            .await
            .unwrap();
        drop(conn);

        let publisher = ReviewPublisher::new(pool.clone(), Duration::from_secs(60));
        assert_eq!(publisher.sweep().await.unwrap(), 1);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reviews::new(&mut conn);
        assert_eq!(repo.get_by_id(due.id).await.unwrap().unwrap().status, ReviewStatus::Approved);
        assert_eq!(repo.get_by_id(later.id).await.unwrap().unwrap().status, ReviewStatus::Pending);
    }
}

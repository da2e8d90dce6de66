use super::RateLimitStore;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use std::time::Duration;
use tokio::sync::Mutex;

/// Counters shared across replicas: `INCR` then `EXPIRE` on `<prefix>:rl:<scope>:<key>:<window>`.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            conn: Mutex::new(None),
        })
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}:rl:{key}", self.prefix)
    }

    async fn connection(&self) -> anyhow::Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.conn.lock().await = None;
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        let key = self.counter_key(key);
        let mut conn = self.connection().await?;

        let result: redis::RedisResult<u64> = async {
            let count: u64 = conn.incr(&key, 1_u64).await?;
            if count == 1 {
                let ttl_secs = ttl.as_secs().max(1) as i64;
                let _: bool = conn.expire(&key, ttl_secs).await?;
            }
            Ok(count)
        }
        .await;

        if result.is_err() {
            self.reset_connection().await;
        }
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_layout() {
        let store = RedisStore::new("redis://127.0.0.1:6379", "ly").unwrap();
        assert_eq!(store.counter_key("messages:user-1:42"), "ly:rl:messages:user-1:42");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisStore::new("not a url", "ly").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_errors() {
        // port 1 is never a redis server; the limiter turns this error into an allow
        let store = RedisStore::new("redis://127.0.0.1:1", "ly").unwrap();
        assert!(store.increment("k", Duration::from_secs(1)).await.is_err());
    }
}

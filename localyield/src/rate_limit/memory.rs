use super::RateLimitStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Sweep expired counters once every this many increments.
const PRUNE_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

/// Process-local counters. Each replica limits on its own.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    counters: DashMap<String, Counter>,
    ops: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&self, now: Instant) {
        self.counters.retain(|_, counter| counter.expires_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        let now = Instant::now();
        if self.ops.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            *entry = Counter {
                count: 0,
                expires_at: now + ttl,
            };
        }
        entry.count += 1;
        Ok(entry.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_per_key() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.increment("a", ttl).await.unwrap(), 1);
        assert_eq!(store.increment("a", ttl).await.unwrap(), 2);
        assert_eq!(store.increment("b", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_counter_restarts() {
        let store = InMemoryStore::new();
        store.increment("a", Duration::ZERO).await.unwrap();
        assert_eq!(store.increment("a", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prunes_stale_windows() {
        let store = InMemoryStore::new();
        for i in 0..PRUNE_EVERY - 1 {
            store.increment(&format!("stale-{i}"), Duration::ZERO).await.unwrap();
        }
        // this increment triggers the sweep before inserting itself
        store.increment("fresh", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}

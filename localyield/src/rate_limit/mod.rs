//! Fixed-window rate limiting.
//!
//! Time is cut into windows of a scope's configured length; each `(scope, key)` pair gets one
//! counter per window and is refused once the counter passes the scope's limit. Counters live in a
//! [`RateLimitStore`]: process-local ([`InMemoryStore`]) or shared through Redis ([`RedisStore`]).
//!
//! If the store fails, the request is allowed and a warning is logged.

mod memory;
pub mod middleware;
mod redis;

pub use memory::InMemoryStore;
pub use redis::RedisStore;

use crate::config::{RateLimitBackend, RateLimitConfig, RateLimitScopes, WindowLimit};
use crate::errors::Error;
use async_trait::async_trait;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

/// Named limit buckets, each with its own [`WindowLimit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Default,
    Writes,
    Auth,
    Messages,
    Reviews,
    Reports,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Default => "default",
            Scope::Writes => "writes",
            Scope::Auth => "auth",
            Scope::Messages => "messages",
            Scope::Reviews => "reviews",
            Scope::Reports => "reports",
        }
    }

    fn limit(&self, scopes: &RateLimitScopes) -> WindowLimit {
        match self {
            Scope::Default => scopes.default,
            Scope::Writes => scopes.writes,
            Scope::Auth => scopes.auth,
            Scope::Messages => scopes.messages,
            Scope::Reviews => scopes.reviews,
            Scope::Reports => scopes.reports,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing storage for window counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the counter at `key` and return its new value.
    ///
    /// `ttl` is how long the counter must survive; it never needs to outlive its window.
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64>;
}

/// Outcome of one counted hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes
    pub reset_after: Duration,
}

impl Decision {
    fn unlimited(limit: WindowLimit) -> Self {
        Self {
            allowed: true,
            limit: limit.limit,
            remaining: limit.limit,
            reset_after: Duration::ZERO,
        }
    }
}

/// Window index containing `now` and the time left until it ends.
pub(crate) fn window_position(now: SystemTime, window: Duration) -> (u64, Duration) {
    let now_ms = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let window_ms = (window.as_millis() as u64).max(1);
    let index = now_ms / window_ms;
    let reset_after = Duration::from_millis(window_ms - now_ms % window_ms);
    (index, reset_after)
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    scopes: RateLimitScopes,
    enabled: bool,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("scopes", &self.scopes)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, scopes: RateLimitScopes, enabled: bool) -> Self {
        Self { store, scopes, enabled }
    }

    /// Build the limiter and its store from configuration.
    pub fn from_config(config: &RateLimitConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn RateLimitStore> = match &config.backend {
            RateLimitBackend::Memory => Arc::new(InMemoryStore::new()),
            RateLimitBackend::Redis { url, prefix } => Arc::new(RedisStore::new(url, prefix)?),
        };
        Ok(Self::new(store, config.scopes.clone(), config.enabled))
    }

    /// Count one hit for `key` in `scope`.
    pub async fn check(&self, scope: Scope, key: &str) -> Decision {
        self.check_at(scope, key, SystemTime::now()).await
    }

    pub(crate) async fn check_at(&self, scope: Scope, key: &str, now: SystemTime) -> Decision {
        let limit = scope.limit(&self.scopes);
        if !self.enabled {
            return Decision::unlimited(limit);
        }

        let (index, reset_after) = window_position(now, limit.window);
        let counter_key = format!("{scope}:{key}:{index}");

        let count = match self.store.increment(&counter_key, reset_after).await {
            Ok(count) => count,
            Err(e) => {
                warn!(%scope, error = %e, "Rate limit store unavailable, allowing request");
                return Decision::unlimited(limit);
            }
        };

        let allowed = count <= u64::from(limit.limit);
        let remaining = u64::from(limit.limit).saturating_sub(count) as u32;
        if !allowed {
            debug!(%scope, key, count, "Rate limit exceeded");
            metrics::counter!("localyield_rate_limited_total", "scope" => scope.as_str()).increment(1);
        }

        Decision {
            allowed,
            limit: limit.limit,
            remaining,
            reset_after,
        }
    }

    /// Count one hit and turn a refusal into a 429.
    pub async fn enforce(&self, scope: Scope, key: &str) -> Result<Decision, Error> {
        let decision = self.check(scope, key).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(Error::TooManyRequests {
                message: format!("Too many {scope} requests, try again later"),
                retry_after: Some(decision.reset_after),
            })
        }
    }
}

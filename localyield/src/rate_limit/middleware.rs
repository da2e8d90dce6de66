use super::{RateLimiter, Scope};
use crate::errors::Error;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Best-effort client address: first `x-forwarded-for` hop, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_write(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Per-address limits for the API: every request counts against `default`, mutating requests
/// also against `writes`. Per-user scopes are enforced by the handlers that own them.
pub async fn rate_limit_middleware(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Result<Response, Error> {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    let key = client_ip(request.headers(), peer);

    let mut decision = limiter.enforce(Scope::Default, &key).await?;
    if is_write(request.method()) {
        decision = limiter.enforce(Scope::Writes, &key).await?;
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        response.headers_mut().insert(REMAINING_HEADER, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitScopes, WindowLimit};
    use crate::rate_limit::InMemoryStore;
    use axum::{
        Router,
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use std::{sync::Arc, time::Duration};

    fn server(default: u32, writes: u32) -> TestServer {
        let scopes = RateLimitScopes {
            default: WindowLimit::new(default, Duration::from_secs(3600)),
            writes: WindowLimit::new(writes, Duration::from_secs(3600)),
            ..RateLimitScopes::default()
        };
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()), scopes, true);
        let app = Router::new()
            .route("/thing", get(|| async { "ok" }))
            .route("/thing", post(|| async { "made" }))
            .layer(from_fn_with_state(limiter, rate_limit_middleware));
        TestServer::new(app).unwrap()
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_default_scope_returns_429_with_retry_after() {
        let server = server(2, 10);
        server.get("/thing").add_header("x-forwarded-for", "198.51.100.1").await.assert_status_ok();
        let second = server.get("/thing").add_header("x-forwarded-for", "198.51.100.1").await;
        second.assert_status_ok();
        assert_eq!(second.headers().get(REMAINING_HEADER).unwrap(), "0");

        let third = server.get("/thing").add_header("x-forwarded-for", "198.51.100.1").await;
        third.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().get("retry-after").is_some());
        let body: serde_json::Value = third.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "RATE_LIMITED");

        // another client is unaffected
        server.get("/thing").add_header("x-forwarded-for", "198.51.100.2").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_writes_have_their_own_budget() {
        let server = server(10, 1);
        server.post("/thing").add_header("x-forwarded-for", "198.51.100.3").await.assert_status_ok();
        server
            .post("/thing")
            .add_header("x-forwarded-for", "198.51.100.3")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
        server.get("/thing").add_header("x-forwarded-for", "198.51.100.3").await.assert_status_ok();
    }
}

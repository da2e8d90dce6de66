//! # localyield: The Local Yield marketplace API
//!
//! `localyield` is the backend for a neighbourhood marketplace. Producers list goods like eggs,
//! honey and produce; buyers find them by distance from a ZIP code and check out; animal owners
//! book caregivers for feeding, milking or barn sitting. Around those flows sit direct messages,
//! reviews with a private resolution window for bad experiences, and a moderation queue.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); everything persistent lives in
//! PostgreSQL. Every route sits under `/api` and answers with a JSON envelope
//! (`{ ok, data }` or `{ ok, error, code }`, see [`api::envelope`]).
//!
//! ### Request flow
//!
//! A request first passes the per-address rate limiter ([`rate_limit`]), then reaches a handler.
//! Handlers that need a caller take a [`CurrentUser`](api::models::users::CurrentUser), which is
//! resolved from a Clerk session token or, in development, from a signed dev cookie ([`auth`]).
//! Handlers check roles and ownership, then talk to PostgreSQL through the repositories in
//! [`db::handlers`]. Multi-step writes (checkout, booking acceptance, report resolution) run in a
//! single transaction.
//!
//! ### Core components
//!
//! - **API** ([`api`]): handlers, request/response models and validation
//! - **Auth** ([`auth`]): Clerk JWT verification, the dev stub and permission checks
//! - **Database** ([`db`]): one repository per table family
//! - **Search** ([`search`], [`geo`]): text and category filtering, ranked by ZIP-centroid distance
//! - **Background**: [`publisher::ReviewPublisher`] makes negative reviews public once their
//!   resolution window passes
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use localyield::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = localyield::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     localyield::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run on startup. To run them yourself:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! localyield::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod geo;
mod openapi;
pub mod publisher;
pub mod rate_limit;
pub mod search;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

use crate::{
    api::handlers::{
        admin, care_bookings, cart, categories, conversations, dev_auth, listings, orders, products, reports, reviews, users,
    },
    auth::clerk::ClerkVerifier,
    config::CorsOrigin,
    geo::ZipDirectory,
    openapi::ApiDoc,
    publisher::ReviewPublisher,
    rate_limit::{RateLimiter, middleware::rate_limit_middleware},
};
use axum::{
    Json, Router,
    extract::OriginalUri,
    http::{self, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// Cloned per request; everything inside is either cheap to clone or behind an `Arc`.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// ZIP centroids for distance search; empty when no file is configured
    #[builder(default)]
    pub zips: Arc<ZipDirectory>,
    pub rate_limiter: RateLimiter,
    /// Present when Clerk sign-in is enabled
    pub clerk: Option<Arc<ClerkVerifier>>,
}

/// Get the migrator for running database migrations.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to PostgreSQL with the configured pool settings and bring the schema up to date.
#[instrument(skip_all)]
pub async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }

    let pool = options.connect(&config.database.url).await?;
    migrator().run(&pool).await?;
    info!(max_connections = settings.max_connections, "Database ready");
    Ok(pool)
}

/// Load ZIP centroids. A missing setting leaves distance search without coordinates rather than
/// failing startup; a configured but unreadable file is an error.
pub fn load_zip_directory(config: &Config) -> anyhow::Result<ZipDirectory> {
    match &config.geo.zip_centroids_path {
        Some(path) => {
            let zips = ZipDirectory::load(path)?;
            info!(path = %path.display(), centroids = zips.len(), "Loaded ZIP centroids");
            Ok(zips)
        }
        None => {
            warn!("No geo.zip_centroids_path configured; listings will have no distances");
            Ok(ZipDirectory::empty())
        }
    }
}

/// Build the shared state from configuration and an open pool.
pub fn build_app_state(config: Config, pool: PgPool) -> anyhow::Result<AppState> {
    let zips = load_zip_directory(&config)?;
    let rate_limiter = RateLimiter::from_config(&config.rate_limit)?;
    let clerk = if config.auth.clerk.enabled {
        Some(Arc::new(ClerkVerifier::from_config(&config.auth.clerk)?))
    } else {
        None
    };

    Ok(AppState::builder()
        .db(pool)
        .config(config)
        .zips(Arc::new(zips))
        .rate_limiter(rate_limiter)
        .maybe_clerk(clerk)
        .build())
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;
    // `*` can't go in an origin list, it has to be the `any` matcher
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::LOCATION, http::header::RETRY_AFTER]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Routes under `/api`, before the rate limiter and state are attached.
fn api_routes(dev_stub_enabled: bool) -> Router<AppState> {
    let router = Router::new()
        // Discovery
        .route("/listings", get(listings::search_listings))
        .route("/caregivers", get(listings::search_caregivers))
        .route("/categories", get(categories::list_categories).post(categories::propose_category))
        // Products
        .route("/products", post(products::create_product))
        .route(
            "/products/{id}",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::archive_product),
        )
        // Cart and checkout
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items/{product_id}", put(cart::put_cart_item).delete(cart::remove_cart_item))
        .route("/orders", post(orders::checkout).get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", patch(orders::update_order_status))
        .route("/orders/{id}/issues", post(orders::raise_order_issue))
        // Reviews
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/{id}", patch(reviews::edit_review).delete(reviews::withdraw_review))
        .route("/reviews/{id}/response", put(reviews::respond_to_review))
        .route("/producers/{id}/reviews", get(reviews::list_producer_reviews))
        // Animal care
        .route("/care-bookings", post(care_bookings::create_booking).get(care_bookings::list_bookings))
        .route("/care-bookings/{id}", get(care_bookings::get_booking))
        .route("/care-bookings/{id}/status", patch(care_bookings::update_booking_status))
        // Messaging
        .route(
            "/conversations",
            post(conversations::start_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversations::list_messages).post(conversations::post_message),
        )
        .route("/conversations/{id}/read", post(conversations::mark_conversation_read))
        .route("/reports", post(reports::create_report))
        // Accounts
        .route("/me", get(users::get_me).patch(users::update_me))
        .route("/me/caregiver-profile", put(users::put_caregiver_profile))
        .route("/me/products", get(products::list_my_products))
        .route("/me/reviews", get(reviews::list_my_reviews))
        .route("/users/{id}", get(users::get_user_profile))
        .route("/users/{id}/products", get(products::list_producer_products))
        // Moderation
        .route("/admin/stats", get(admin::get_stats))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", patch(admin::update_user))
        .route("/admin/reports", get(admin::list_reports))
        .route("/admin/reports/{id}", patch(admin::resolve_report))
        .route("/admin/reviews", get(reviews::list_reviews_for_moderation))
        .route("/admin/reviews/{id}", patch(reviews::moderate_review))
        .route("/admin/categories", get(categories::list_custom_categories))
        .route("/admin/categories/{id}", patch(categories::decide_category));

    if dev_stub_enabled {
        router
            .route("/dev/login", post(dev_auth::dev_login))
            .route("/dev/logout", post(dev_auth::dev_logout))
    } else {
        router
    }
}

/// Envelope 404 for requests no route matches.
async fn unknown_route(method: http::Method, OriginalUri(uri): OriginalUri) -> errors::Error {
    errors::Error::UnknownRoute {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

/// Build the main application router with all endpoints and middleware.
///
/// - `/api/*`: the marketplace API, behind the per-address rate limiter
/// - `/api-docs/openapi.json` and `/docs`: the OpenAPI document and its viewer
/// - `/healthz`: liveness
/// - `/internal/metrics`: Prometheus text, when `enable_metrics` is set
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api = api_routes(state.config.auth.dev_stub.enabled)
        .layer(from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .fallback(unknown_route);

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// Dropping this without calling [`shutdown`](BackgroundServices::shutdown) still cancels the
/// tasks through `drop_guard`.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the review publisher.
fn setup_background_services(pool: PgPool, config: &Config, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let publisher = ReviewPublisher::new(pool, config.reviews.publish_interval);
    let publisher_shutdown = shutdown_token.clone();
    background_tasks.push(tokio::spawn(publisher.run(publisher_shutdown)));

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, loads ZIP
///    centroids and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight requests finish, background
///    tasks stop and the pool closes
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application, reusing `pool` when given instead of connecting from config.
    /// Migrations run either way.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting Local Yield with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let shutdown_token = CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), &config, shutdown_token);

        let app_state = build_app_state(config.clone(), pool.clone())?;
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Local Yield listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Socket addresses feed the rate limiter when there is no x-forwarded-for
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        api::models::users::Role,
        config::{RateLimitScopes, WindowLimit},
        test_utils::{
            create_test_admin_user, create_test_app, create_test_app_state, create_test_config, create_test_order,
            create_test_product, create_test_user, dev_cookie,
        },
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    /// Router over a pool that never connects; fine for anything rejected before the database.
    fn offline_server(config: Config) -> TestServer {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/unused")
            .unwrap();
        let state = create_test_app_state(pool, config);
        TestServer::new(build_router(&state).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let server = offline_server(create_test_config());
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let server = offline_server(create_test_config());
        let response = server.get("/api-docs/openapi.json").await;
        response.assert_status_ok();
        let doc: Value = response.json();
        assert!(doc["paths"]["/listings"].is_object());
    }

    #[test_log::test(tokio::test)]
    async fn test_me_requires_authentication() {
        let server = offline_server(create_test_config());
        let response = server.get("/api/me").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_malformed_zip_rejected_before_search() {
        let server = offline_server(create_test_config());
        let response = server.get("/api/listings").add_query_param("zip", "12ab").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_input_gets_error_envelope() {
        let server = offline_server(create_test_config());

        let response = server
            .post("/api/dev/login")
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "BAD_REQUEST");

        let response = server.get("/api/listings").add_query_param("radius", "far").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let response = server.get("/api/products/not-a-uuid").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let response = server.get("/api/no-such-thing").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "No route for GET /api/no-such-thing");
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let server = offline_server(create_test_config());
        let response = server
            .method(http::Method::OPTIONS, "/api/orders")
            .add_header(http::header::ORIGIN, "http://localhost:3000")
            .add_header(http::header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .await;
        assert_eq!(
            response.headers().get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get(http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_dev_routes_absent_when_stub_disabled() {
        let mut config = create_test_config();
        config.auth.dev_stub.enabled = false;
        let server = offline_server(config);
        let response = server.post("/api/dev/login").json(&json!({"email": "a@b.co"})).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[test_log::test(tokio::test)]
    async fn test_rate_limit_applies_to_api() {
        let mut config = create_test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.scopes = RateLimitScopes {
            default: WindowLimit {
                limit: 1,
                window: Duration::from_secs(60),
            },
            ..RateLimitScopes::default()
        };
        let server = offline_server(config);

        server.get("/api/me").await.assert_status(StatusCode::UNAUTHORIZED);
        let refused = server.get("/api/me").await;
        refused.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(refused.headers().contains_key(http::header::RETRY_AFTER));

        // Health checks are outside the limiter
        server.get("/healthz").await.assert_status_ok();
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_dev_login_then_me(pool: PgPool) {
        let (server, _bg) = create_test_app(pool).await;

        let login = server
            .post("/api/dev/login")
            .json(&json!({"email": "Hen.Keeper@Example.com", "roles": ["producer"]}))
            .await;
        login.assert_status_ok();
        let cookie = login.headers().get(http::header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        let pair = cookie.split(';').next().unwrap().to_string();

        let me = server.get("/api/me").add_header(http::header::COOKIE, pair).await;
        me.assert_status_ok();
        let body: Value = me.json();
        assert_eq!(body["data"]["email"], "hen.keeper@example.com");
        let roles = body["data"]["roles"].as_array().unwrap();
        assert!(roles.contains(&json!("producer")));
        assert!(roles.contains(&json!("buyer")));
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_checkout_splits_by_producer_and_decrements_stock(pool: PgPool) {
        let config = create_test_config();
        let buyer = create_test_user(&pool, &[Role::Buyer]).await;
        let first = create_test_user(&pool, &[Role::Producer]).await;
        let second = create_test_user(&pool, &[Role::Producer]).await;
        let eggs = create_test_product(&pool, first.id, "Duck eggs", "eggs", 10).await;
        let honey = create_test_product(&pool, second.id, "Clover honey", "honey", 3).await;
        let (server, _bg) = create_test_app(pool.clone()).await;

        let response = server
            .post("/api/orders")
            .add_header(http::header::COOKIE, dev_cookie(buyer.id, &config))
            .json(&json!({"items": [
                {"product_id": eggs.id, "quantity": 2},
                {"product_id": honey.id, "quantity": 3}
            ]}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let left: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(honey.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);

        // Sold out now, so a second checkout fails without writing anything
        let again = server
            .post("/api/orders")
            .add_header(http::header::COOKIE, dev_cookie(buyer.id, &config))
            .json(&json!({"items": [{"product_id": honey.id, "quantity": 1}]}))
            .await;
        again.assert_status(StatusCode::CONFLICT);
        let body: Value = again.json();
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_resolving_product_report_archives_it(pool: PgPool) {
        let config = create_test_config();
        let reporter = create_test_user(&pool, &[Role::Buyer]).await;
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let admin = create_test_admin_user(&pool).await;
        let product = create_test_product(&pool, producer.id, "Miracle tonic", "preserves", 1).await;
        let (server, _bg) = create_test_app(pool.clone()).await;

        let filed = server
            .post("/api/reports")
            .add_header(http::header::COOKIE, dev_cookie(reporter.id, &config))
            .json(&json!({"target_type": "product", "target_id": product.id, "reason": "fraud"}))
            .await;
        filed.assert_status(StatusCode::CREATED);
        let report_id = filed.json::<Value>()["data"]["id"].as_str().unwrap().to_string();

        // Only admins see the queue
        server
            .get("/api/admin/reports")
            .add_header(http::header::COOKIE, dev_cookie(reporter.id, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let resolve = json!({"status": "resolved", "resolution_note": "Health claims", "hide_target": true});
        server
            .patch(&format!("/api/admin/reports/{report_id}"))
            .add_header(http::header::COOKIE, dev_cookie(admin.id, &config))
            .json(&resolve)
            .await
            .assert_status_ok();

        let archived: bool = sqlx::query_scalar("SELECT is_archived FROM products WHERE id = $1")
            .bind(product.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(archived);

        let again = server
            .patch(&format!("/api/admin/reports/{report_id}"))
            .add_header(http::header::COOKIE, dev_cookie(admin.id, &config))
            .json(&resolve)
            .await;
        again.assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_negative_review_waits_out_resolution_window(pool: PgPool) {
        let config = create_test_config();
        let buyer = create_test_user(&pool, &[Role::Buyer]).await;
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let order = create_test_order(&pool, buyer.id, producer.id).await;
        let (server, _bg) = create_test_app(pool.clone()).await;
        let reviews_path = format!("/api/producers/{}/reviews", producer.id);

        let created = server
            .post("/api/reviews")
            .add_header(http::header::COOKIE, dev_cookie(buyer.id, &config))
            .json(&json!({"order_id": order.id, "rating": 1, "body": "Half the eggs were cracked"}))
            .await;
        created.assert_status(StatusCode::CREATED);
        let review: Value = created.json();
        assert_eq!(review["data"]["status"], "pending");
        assert!(review["data"]["publish_at"].is_string());

        // Hidden from the public while the window is open
        let listed: Value = server.get(&reviews_path).await.json();
        assert_eq!(listed["data"]["review_count"], 0);
        assert!(listed["data"]["items"].as_array().unwrap().is_empty());

        // The producer hears about it in the order's conversation
        let conversations: Value = server
            .get("/api/conversations")
            .add_header(http::header::COOKIE, dev_cookie(producer.id, &config))
            .await
            .json();
        let thread = conversations["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["order_id"] == json!(order.id))
            .expect("order conversation exists");
        let messages: Value = server
            .get(&format!("/api/conversations/{}/messages", thread["id"].as_str().unwrap()))
            .add_header(http::header::COOKIE, dev_cookie(producer.id, &config))
            .await
            .json();
        let notice = &messages["data"][0];
        assert!(notice["sender_id"].is_null());
        assert!(notice["body"].as_str().unwrap().contains("1-star review"));

        // Once the window has passed, the next public read publishes it
        sqlx::query("UPDATE reviews SET publish_at = NOW() - INTERVAL '1 minute' WHERE order_id = $1")
            .bind(order.id)
            .execute(&pool)
            .await
            .unwrap();
        let listed: Value = server.get(&reviews_path).await.json();
        assert_eq!(listed["data"]["review_count"], 1);
        assert_eq!(listed["data"]["items"][0]["status"], "approved");
        assert_eq!(listed["data"]["items"][0]["rating"], 1);
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_accepting_overlapping_booking_conflicts(pool: PgPool) {
        let config = create_test_config();
        let caregiver = create_test_user(&pool, &[]).await;
        let first_owner = create_test_user(&pool, &[]).await;
        let second_owner = create_test_user(&pool, &[]).await;
        let (server, _bg) = create_test_app(pool.clone()).await;

        server
            .put("/api/me/caregiver-profile")
            .add_header(http::header::COOKIE, dev_cookie(caregiver.id, &config))
            .json(&json!({"bio": "Raised goats for years", "services": ["feeding", "milking"], "rate_per_day": "40.00", "zip": "05401"}))
            .await
            .assert_status_ok();

        let today = chrono::Utc::now().date_naive();
        let day = |n: u64| (today + chrono::Days::new(n)).to_string();
        let mut booking_ids = Vec::new();
        for (owner, start, end) in [(&first_owner, day(10), day(12)), (&second_owner, day(12), day(14))] {
            let requested = server
                .post("/api/care-bookings")
                .add_header(http::header::COOKIE, dev_cookie(owner.id, &config))
                .json(&json!({"caregiver_id": caregiver.id, "start_date": start, "end_date": end, "animals": "6 hens"}))
                .await;
            requested.assert_status(StatusCode::CREATED);
            let body: Value = requested.json();
            assert_eq!(body["data"]["total_estimate"], "120.00");
            booking_ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        let accept = json!({"status": "accepted"});
        let first = server
            .patch(&format!("/api/care-bookings/{}/status", booking_ids[0]))
            .add_header(http::header::COOKIE, dev_cookie(caregiver.id, &config))
            .json(&accept)
            .await;
        first.assert_status_ok();
        assert_eq!(first.json::<Value>()["data"]["status"], "accepted");

        // Day 12 is already taken
        let second = server
            .patch(&format!("/api/care-bookings/{}/status", booking_ids[1]))
            .add_header(http::header::COOKIE, dev_cookie(caregiver.id, &config))
            .json(&accept)
            .await;
        second.assert_status(StatusCode::CONFLICT);
        assert_eq!(second.json::<Value>()["code"], "CONFLICT");

        let status: String = sqlx::query_scalar("SELECT status::text FROM care_bookings WHERE id = $1::uuid")
            .bind(&booking_ids[1])
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "requested");
    }
}

//! Test utilities for integration testing (available with `test-utils` feature).

use crate::{
    api::models::{
        orders::{OrderStatus, PlannedLine, PlannedOrder},
        users::Role,
    },
    auth::dev_stub,
    config::{Config, DatabaseConfig, PoolSettings, RateLimitConfig},
    db::{
        handlers::{Orders, Products, Repository, Users},
        models::{
            orders::OrderDBResponse,
            products::{ProductCreateDBRequest, ProductDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    types::UserId,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub const TEST_SECRET_KEY: &str = "test-secret-key-for-testing-only";

/// Full application over `pool`, with the review publisher running.
#[cfg(test)]
pub async fn create_test_app(pool: PgPool) -> (axum_test::TestServer, crate::BackgroundServices) {
    let app = crate::Application::new_with_pool(create_test_config(), Some(pool))
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            // Will get overriden by the test pool
            url: "postgres://localhost/unused".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        secret_key: Some(TEST_SECRET_KEY.to_string()),
        admin_emails: vec!["admin@test.com".to_string()],
        rate_limit: RateLimitConfig {
            enabled: false,
            ..Default::default()
        },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    };
    config.auth.dev_stub.enabled = true;
    config.auth.clerk.enabled = false;
    config
}

pub fn create_test_app_state(pool: PgPool, config: Config) -> crate::AppState {
    crate::build_app_state(config, pool).expect("Failed to build app state")
}

/// `Cookie` header value signing in as `user_id` through the dev stub.
pub fn dev_cookie(user_id: UserId, config: &Config) -> String {
    let secret = config.secret_key.as_deref().expect("test config has a secret key");
    let value = dev_stub::sign(user_id, secret).expect("HMAC accepts any key length");
    format!("{}={value}", config.auth.dev_stub.cookie_name)
}

/// A user with a unique email and the given roles (buyer is always added).
pub async fn create_test_user(pool: &PgPool, roles: &[Role]) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let suffix = Uuid::new_v4().simple().to_string();
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            external_id: None,
            email: format!("user-{suffix}@example.com"),
            display_name: Some(format!("Test User {}", &suffix[..8])),
            auth_source: "test".to_string(),
            roles: roles.to_vec(),
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserDBResponse {
    create_test_user(pool, &[Role::Admin]).await
}

/// A listed product priced at 4.50 per unit in ZIP 05401.
pub async fn create_test_product(pool: &PgPool, producer_id: UserId, title: &str, category: &str, stock: i32) -> ProductDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Products::new(&mut conn)
        .create(&ProductCreateDBRequest {
            producer_id,
            title: title.to_string(),
            description: format!("{title} from the test farm"),
            category: category.to_string(),
            price: Decimal::new(450, 2),
            unit: "each".to_string(),
            stock,
            zip: "05401".to_string(),
            image_url: None,
        })
        .await
        .expect("Failed to create test product")
}

/// A fulfilled one-line order from `buyer_id` to `producer_id`, ready to be reviewed.
pub async fn create_test_order(pool: &PgPool, buyer_id: UserId, producer_id: UserId) -> OrderDBResponse {
    let product = create_test_product(pool, producer_id, "Farm eggs", "eggs", 12).await;

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let planned = PlannedOrder {
        producer_id,
        lines: vec![PlannedLine {
            product_id: product.id,
            title: product.title.clone(),
            unit: product.unit.clone(),
            unit_price: product.price,
            quantity: 1,
            line_total: product.price,
        }],
        subtotal: product.price,
    };
    let mut orders = Orders::new(&mut conn);
    let (order, _) = orders.create(buyer_id, &planned, None).await.expect("Failed to create test order");
    orders
        .set_status(order.id, OrderStatus::Fulfilled)
        .await
        .expect("Failed to fulfil test order")
}

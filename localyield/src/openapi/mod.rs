//! OpenAPI document for the `/api` surface, served as JSON at `/api-docs/openapi.json` and
//! rendered at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::handlers;

/// Clerk session JWT as a bearer token, or the dev-stub cookie in local development.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Clerk session token. Browsers send it in the `__session` cookie; other clients use:\n\n\
                            ```\nAuthorization: Bearer <session token>\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "ly_dev_user",
                    "Development login cookie set by `POST /dev/login`. Only accepted when the dev stub is enabled.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers((url = "/api", description = "Local Yield API")),
    modifiers(&SecurityAddon),
    paths(
        handlers::listings::search_listings,
        handlers::listings::search_caregivers,
        handlers::categories::list_categories,
        handlers::categories::propose_category,
        handlers::categories::list_custom_categories,
        handlers::categories::decide_category,
        handlers::products::create_product,
        handlers::products::get_product,
        handlers::products::update_product,
        handlers::products::archive_product,
        handlers::products::list_my_products,
        handlers::products::list_producer_products,
        handlers::cart::get_cart,
        handlers::cart::put_cart_item,
        handlers::cart::remove_cart_item,
        handlers::cart::clear_cart,
        handlers::orders::checkout,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::update_order_status,
        handlers::orders::raise_order_issue,
        handlers::reviews::create_review,
        handlers::reviews::edit_review,
        handlers::reviews::withdraw_review,
        handlers::reviews::respond_to_review,
        handlers::reviews::list_producer_reviews,
        handlers::reviews::list_my_reviews,
        handlers::reviews::list_reviews_for_moderation,
        handlers::reviews::moderate_review,
        handlers::care_bookings::create_booking,
        handlers::care_bookings::list_bookings,
        handlers::care_bookings::get_booking,
        handlers::care_bookings::update_booking_status,
        handlers::conversations::start_conversation,
        handlers::conversations::list_conversations,
        handlers::conversations::list_messages,
        handlers::conversations::post_message,
        handlers::conversations::mark_conversation_read,
        handlers::reports::create_report,
        handlers::admin::get_stats,
        handlers::admin::list_users,
        handlers::admin::update_user,
        handlers::admin::list_reports,
        handlers::admin::resolve_report,
        handlers::users::get_me,
        handlers::users::update_me,
        handlers::users::put_caregiver_profile,
        handlers::users::get_user_profile,
        handlers::dev_auth::dev_login,
        handlers::dev_auth::dev_logout,
    ),
    tags(
        (name = "listings", description = "Search products and caregivers by text, category and distance from a ZIP code."),
        (name = "categories", description = "Built-in categories plus producer-proposed ones approved by an admin."),
        (name = "products", description = "Producer listings. Deleting a product archives it; past orders keep their snapshot."),
        (name = "cart", description = "A server-side cart per user."),
        (name = "orders", description = "Checkout creates one order per producer in a single transaction.

Status flow: `pending → confirmed → ready → fulfilled → completed`, with `canceled` possible before `ready`."),
        (name = "reviews", description = "Ratings for delivered orders.

Negative reviews stay private for a resolution window so buyer and producer can work things out first."),
        (name = "care-bookings", description = "Animal-care requests between owners and caregivers."),
        (name = "messages", description = "Direct messages between two users, optionally about a product, order or booking."),
        (name = "reports", description = "Flag products, reviews, users or messages for an admin to look at."),
        (name = "admin", description = "Moderation and marketplace management. Admins only."),
        (name = "users", description = "Your account and public profiles."),
        (name = "dev", description = "Passwordless login for local development. Absent in production."),
    ),
    info(
        title = "The Local Yield API",
        version = "1.0.0",
        description = "Marketplace API connecting local producers, buyers and animal-care providers.

## Responses

Every response is a JSON envelope. Success:

```json
{ \"ok\": true, \"data\": { ... } }
```

Failure:

```json
{ \"ok\": false, \"error\": \"Product 3f2a... not found\", \"code\": \"NOT_FOUND\" }
```

`code` is stable and safe to branch on; `error` is meant for people.

## Rate limits

Requests are counted in fixed windows per client address, with tighter per-user limits on messages, reviews and reports. A refused request gets `429`, code `RATE_LIMITED` and a `Retry-After` header.",
    ),
)]
pub struct ApiDoc;

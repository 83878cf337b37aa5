//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database ping)
//! GET  /uploads/{name}                  - Uploaded images
//!
//! # Auth
//! POST /api/auth/register | login | logout
//! POST /api/auth/verify-email | resend-verification
//! POST /api/auth/forgot-password | reset-password
//! GET  /api/auth/me                     PUT /api/auth/me
//! PUT  /api/auth/password
//! GET  /api/auth/addresses              PUT /api/auth/addresses
//!
//! # Catalog
//! GET  /api/products                    POST /api/products (admin)
//! GET  /api/products/categories | brands
//! GET  /api/products/{id}               PUT|DELETE /api/products/{id} (admin)
//!
//! # Cart (bearer token or X-Session-Id)
//! GET|DELETE /api/cart
//! POST /api/cart/items                  PUT|DELETE /api/cart/items/{product_id}
//! POST /api/cart/merge
//!
//! # Orders
//! POST /api/orders                      GET /api/orders
//! GET  /api/orders/{id}                 POST /api/orders/{id}/cancel
//!
//! # Admin
//! GET  /api/admin/dashboard | users | orders | products/low-stock
//! GET  /api/admin/orders/by-number/{order_number}
//! PUT  /api/admin/users/{id}/role       DELETE /api/admin/users/{id}
//! PUT  /api/admin/orders/{id}/status | tracking
//!
//! # Analytics (admin)
//! GET  /api/analytics/revenue | top-products | categories | hourly | geographic | status
//!
//! # Payments
//! GET  /api/payments/config
//! POST /api/payments/stripe/intent | stripe/webhook
//! POST /api/payments/paypal/order | paypal/capture | paypal/webhook
//!
//! # Uploads (admin)
//! POST /api/upload                      DELETE /api/upload/{name}
//! ```

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod cart;
pub mod orders;
pub mod payments;
pub mod products;
pub mod upload;

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::from_fn,
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::config::ApiConfig;
use crate::middleware::auth::SESSION_ID_HEADER;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, request_id_middleware, security_headers_middleware,
};
use crate::services::uploads::PUBLIC_PREFIX;
use crate::state::AppState;

/// All `/api` routes.
pub fn api_routes(config: &ApiConfig) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router().layer(auth_rate_limiter()))
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/admin", admin::router())
        .nest("/analytics", analytics::router())
        .nest("/payments", payments::router())
        .nest("/upload", upload::router(config.uploads.max_bytes))
        .layer(api_rate_limiter())
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_ID_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}

/// The complete application, ready to serve.
pub fn app(state: AppState) -> Router {
    let config = state.config().clone();

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes(&config))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(&config.uploads.dir))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&config))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

//! Integration tests for the Emporium API.
//!
//! The tests drive a running server over HTTP, so they are `#[ignore]`d by
//! default.
//!
//! # Running Tests
//!
//! ```bash
//! emporium migrate
//! cargo run -p emporium-api &
//! cargo test -p emporium-integration-tests -- --ignored
//! ```
//!
//! # Environment
//!
//! - `API_BASE_URL` - server under test (default `http://localhost:4000`)
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD` - an existing admin account, created
//!   with `emporium admin create`; admin tests skip themselves without it
//! - `STRIPE_WEBHOOK_SECRET` - the server's Stripe webhook secret; Stripe
//!   payment tests skip themselves without it

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

/// Password used for every account the tests register.
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Base URL for the API (configurable via environment).
#[must_use]
pub fn api_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:4000".to_string())
}

/// HTTP client for one simulated visitor.
///
/// Each client claims its own `X-Forwarded-For` address so the per-IP rate
/// limits apply per test rather than to the whole suite.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn client() -> Client {
    let [a, b, c, ..] = *Uuid::new_v4().as_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_str(&format!("10.{a}.{b}.{c}"))
            .unwrap_or_else(|e| panic!("Invalid forwarded address: {e}")),
    );

    Client::builder()
        .default_headers(headers)
        .build()
        .unwrap_or_else(|e| panic!("Failed to create HTTP client: {e}"))
}

/// A fresh, unique email address.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", Uuid::new_v4().simple())
}

/// A fresh anonymous cart session id.
#[must_use]
pub fn session_id() -> String {
    format!("it_{}", Uuid::new_v4().simple())
}

/// `/api` URL for `path`.
#[must_use]
pub fn api(path: &str) -> String {
    format!("{}/api{path}", api_base_url())
}

/// Send a request and parse a JSON body, asserting on the status first.
///
/// # Panics
///
/// Panics if the request fails, the status differs, or the body is not JSON.
pub async fn expect_json(request: RequestBuilder, status: StatusCode) -> Value {
    let response = send(request).await;
    let actual = response.status();
    let body = response.text().await.unwrap_or_default();
    assert_eq!(actual, status, "unexpected status, body: {body}");
    serde_json::from_str(&body).unwrap_or_else(|e| panic!("Invalid JSON ({e}): {body}"))
}

/// Send a request.
///
/// # Panics
///
/// Panics if the server cannot be reached.
pub async fn send(request: RequestBuilder) -> Response {
    request
        .send()
        .await
        .unwrap_or_else(|e| panic!("Request failed: {e}"))
}

/// A signed-in account.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: Value,
}

impl Session {
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Register a new customer and return its session.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn register(client: &Client) -> Session {
    let body = expect_json(
        client.post(api("/auth/register")).json(&json!({
            "email": unique_email(),
            "password": TEST_PASSWORD,
            "name": "Integration Tester",
        })),
        StatusCode::CREATED,
    )
    .await;

    Session {
        token: body["token"].as_str().unwrap_or_default().to_string(),
        user: body["user"].clone(),
    }
}

/// Log in as the admin named by `ADMIN_EMAIL` / `ADMIN_PASSWORD`, if set.
///
/// # Panics
///
/// Panics if the credentials are set but rejected.
pub async fn admin_session(client: &Client) -> Option<Session> {
    let email = std::env::var("ADMIN_EMAIL").ok()?;
    let password = std::env::var("ADMIN_PASSWORD").ok()?;

    let body = expect_json(
        client
            .post(api("/auth/login"))
            .json(&json!({ "email": email, "password": password })),
        StatusCode::OK,
    )
    .await;

    Some(Session {
        token: body["token"].as_str().unwrap_or_default().to_string(),
        user: body["user"].clone(),
    })
}

/// A shipping address that passes validation.
#[must_use]
pub fn test_address() -> Value {
    json!({
        "full_name": "Integration Tester",
        "line1": "1 Test Street",
        "city": "Springfield",
        "state": "OR",
        "postal_code": "97477",
        "country": "US",
        "is_default": true,
    })
}

/// First in-stock product in the catalog.
///
/// # Panics
///
/// Panics if the listing fails.
pub async fn any_product(client: &Client) -> Value {
    let page = expect_json(
        client.get(api("/products?in_stock=true&per_page=1")),
        StatusCode::OK,
    )
    .await;
    page["items"][0].clone()
}

/// Create an active product with `stock` units, as `admin`.
///
/// # Panics
///
/// Panics if the product cannot be created.
pub async fn create_product(client: &Client, admin: &Session, stock: i32) -> Value {
    expect_json(
        client
            .post(api("/products"))
            .header("authorization", admin.bearer())
            .json(&json!({
                "name": format!("Stock Check {}", Uuid::new_v4().simple()),
                "price": "12.50",
                "category": "Testing",
                "brand": "Emporium",
                "stock": stock,
            })),
        StatusCode::CREATED,
    )
    .await
}

/// Current stock of a product, read through the public catalog.
///
/// # Panics
///
/// Panics if the product cannot be read.
pub async fn stock_of(client: &Client, product: &Value) -> i64 {
    let current = expect_json(
        client.get(api(&format!("/products/{}", product["id"]))),
        StatusCode::OK,
    )
    .await;
    current["stock"].as_i64().unwrap_or(-1)
}

/// Put `quantity` of `product` in the user's cart and place an order.
///
/// # Panics
///
/// Panics if either request fails.
pub async fn place_order(
    client: &Client,
    user: &Session,
    product: &Value,
    quantity: u32,
    payment_method: &str,
) -> Value {
    expect_json(
        client
            .post(api("/cart/items"))
            .header("authorization", user.bearer())
            .json(&json!({ "product_id": product["id"], "quantity": quantity })),
        StatusCode::OK,
    )
    .await;

    expect_json(
        client
            .post(api("/orders"))
            .header("authorization", user.bearer())
            .json(&json!({
                "shipping_address": test_address(),
                "payment_method": payment_method,
            })),
        StatusCode::CREATED,
    )
    .await
}

/// `Stripe-Signature` header for `payload`, signed now with `secret`.
///
/// # Panics
///
/// Panics if the secret is rejected as an HMAC key.
#[must_use]
pub fn stripe_signature(secret: &str, payload: &str) -> String {
    let ts = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|e| panic!("Invalid HMAC key: {e}"));
    mac.update(format!("{ts}.{payload}").as_bytes());
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

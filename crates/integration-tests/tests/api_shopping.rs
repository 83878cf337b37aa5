//! Integration tests for the catalog, carts, checkout and orders.
//!
//! These tests require:
//! - A migrated and seeded database (emporium seed --file products.yaml)
//!   with at least one active product in stock
//! - The API server running (cargo run -p emporium-api)
//!
//! Run with: cargo test -p emporium-integration-tests -- --ignored

use emporium_integration_tests::{
    admin_session, any_product, api, client, create_product, expect_json, place_order, register,
    send, session_id, stock_of, test_address,
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running API server and seeded catalog"]
async fn test_product_listing_is_paginated() {
    let client = client();
    let page = expect_json(
        client.get(api("/products?per_page=2&sort=price_asc")),
        StatusCode::OK,
    )
    .await;

    assert_eq!(page["page"], 1);
    assert_eq!(page["per_page"], 2);
    assert!(page["items"].as_array().is_some_and(|items| items.len() <= 2));
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_unknown_product_is_404() {
    let client = client();
    let response = send(client.get(api("/products/999999999"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running API server and seeded catalog"]
async fn test_guest_cart_merges_into_account() {
    let client = client();
    let product = any_product(&client).await;
    let session = session_id();

    let cart = expect_json(
        client
            .post(api("/cart/items"))
            .header("x-session-id", &session)
            .json(&json!({ "product_id": product["id"], "quantity": 1 })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["item_count"], 1);

    let user = register(&client).await;
    let merged = expect_json(
        client
            .post(api("/cart/merge"))
            .header("authorization", user.bearer())
            .header("x-session-id", &session),
        StatusCode::OK,
    )
    .await;
    assert_eq!(merged["items"][0]["product_id"], product["id"]);

    let guest = expect_json(
        client.get(api("/cart")).header("x-session-id", &session),
        StatusCode::OK,
    )
    .await;
    assert_eq!(guest["item_count"], 0);
}

#[tokio::test]
#[ignore = "Requires running API server and seeded catalog"]
async fn test_clearing_guest_cart_starts_over() {
    let client = client();
    let product = any_product(&client).await;
    let session = session_id();

    expect_json(
        client
            .post(api("/cart/items"))
            .header("x-session-id", &session)
            .json(&json!({ "product_id": product["id"], "quantity": 1 })),
        StatusCode::OK,
    )
    .await;

    let cleared = expect_json(
        client.delete(api("/cart")).header("x-session-id", &session),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cleared["item_count"], 0);

    // the session can keep shopping after its cart row is gone
    let cart = expect_json(
        client
            .post(api("/cart/items"))
            .header("x-session-id", &session)
            .json(&json!({ "product_id": product["id"], "quantity": 1 })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["item_count"], 1);
}

#[tokio::test]
#[ignore = "Requires running API server and seeded catalog"]
async fn test_checkout_then_cancel() {
    let client = client();
    let product = any_product(&client).await;
    let user = register(&client).await;

    expect_json(
        client
            .post(api("/cart/items"))
            .header("authorization", user.bearer())
            .json(&json!({ "product_id": product["id"], "quantity": 1 })),
        StatusCode::OK,
    )
    .await;

    let order = expect_json(
        client
            .post(api("/orders"))
            .header("authorization", user.bearer())
            .json(&json!({
                "shipping_address": test_address(),
                "payment_method": "cash_on_delivery",
            })),
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert!(order["order_number"].as_str().is_some_and(|n| n.starts_with("ORD-")));

    let cart = expect_json(
        client.get(api("/cart")).header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["item_count"], 0);

    let history = expect_json(
        client.get(api("/orders")).header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(history["total"], 1);

    let stranger = register(&client).await;
    let response = send(
        client
            .get(api(&format!("/orders/{}", order["id"])))
            .header("authorization", stranger.bearer()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cancelled = expect_json(
        client
            .post(api(&format!("/orders/{}/cancel", order["id"])))
            .header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cancelled["status"], "cancelled");

    let again = send(
        client
            .post(api(&format!("/orders/{}/cancel", order["id"])))
            .header("authorization", user.bearer()),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_checkout_with_empty_cart_is_rejected() {
    let client = client();
    let user = register(&client).await;

    let response = send(
        client
            .post(api("/orders"))
            .header("authorization", user.bearer())
            .json(&json!({
                "shipping_address": test_address(),
                "payment_method": "stripe",
            })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_checkout_takes_stock_and_cancel_returns_it() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };
    let product = create_product(&client, &admin, 5).await;
    let user = register(&client).await;

    let order = place_order(&client, &user, &product, 2, "cash_on_delivery").await;
    assert_eq!(stock_of(&client, &product).await, 3);

    expect_json(
        client
            .post(api(&format!("/orders/{}/cancel", order["id"])))
            .header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(stock_of(&client, &product).await, 5);
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_checkout_rejects_stock_sold_since_add() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };
    let product = create_product(&client, &admin, 3).await;
    let user = register(&client).await;

    expect_json(
        client
            .post(api("/cart/items"))
            .header("authorization", user.bearer())
            .json(&json!({ "product_id": product["id"], "quantity": 2 })),
        StatusCode::OK,
    )
    .await;

    expect_json(
        client
            .put(api(&format!("/products/{}", product["id"])))
            .header("authorization", admin.bearer())
            .json(&json!({ "stock": 1 })),
        StatusCode::OK,
    )
    .await;

    let response = send(
        client
            .post(api("/orders"))
            .header("authorization", user.bearer())
            .json(&json!({
                "shipping_address": test_address(),
                "payment_method": "cash_on_delivery",
            })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // nothing was written: stock, cart and order history are untouched
    assert_eq!(stock_of(&client, &product).await, 1);
    let cart = expect_json(
        client.get(api("/cart")).header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(cart["items"][0]["quantity"], 2);
    assert_eq!(cart["items"][0]["available"], false);
    let history = expect_json(
        client.get(api("/orders")).header("authorization", user.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(history["total"], 0);
}

//! Integration tests for the admin, analytics and upload endpoints.
//!
//! These tests require:
//! - The API server running (cargo run -p emporium-api)
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD` for an account created with
//!   `emporium admin create`; without them the tests return early
//!
//! Run with: cargo test -p emporium-integration-tests -- --ignored

use emporium_integration_tests::{
    admin_session, any_product, api, client, expect_json, place_order, register, send,
};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_customers_cannot_reach_admin() {
    let client = client();
    let user = register(&client).await;

    for path in ["/admin/dashboard", "/admin/users", "/analytics/revenue"] {
        let response = send(client.get(api(path)).header("authorization", user.bearer())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_dashboard_and_analytics() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };

    let summary = expect_json(
        client
            .get(api("/admin/dashboard"))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    assert!(summary["total_orders"].is_i64());

    let before = summary["total_customers"].as_i64().unwrap_or_default();
    register(&client).await;
    let after = expect_json(
        client
            .get(api("/admin/dashboard"))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    // the summary is cached briefly, so only monotonicity is checked
    assert!(after["total_customers"].as_i64().unwrap_or_default() >= before);

    let revenue = expect_json(
        client
            .get(api("/analytics/revenue?period=week"))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    assert!(revenue.as_array().is_some_and(|points| !points.is_empty()));

    let statuses = expect_json(
        client
            .get(api("/analytics/status"))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(statuses.as_array().map(Vec::len), Some(7));
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_product_lifecycle() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };

    let brand = format!("Lifecycle-{}", Uuid::new_v4().simple());
    let created = expect_json(
        client
            .post(api("/products"))
            .header("authorization", admin.bearer())
            .json(&json!({
                "name": "Integration Lamp",
                "price": "19.99",
                "category": "Testing",
                "brand": brand,
                "stock": 3,
            })),
        StatusCode::CREATED,
    )
    .await;
    let path = format!("/products/{}", created["id"]);

    let updated = expect_json(
        client
            .put(api(&path))
            .header("authorization", admin.bearer())
            .json(&json!({ "stock": 1 })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["stock"], 1);

    let response = send(client.delete(api(&path)).header("authorization", admin.bearer())).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(client.get(api(&path))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listing = format!("/products?brand={brand}&include_inactive=true");
    let for_admin = expect_json(
        client
            .get(api(&listing))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(for_admin["items"][0]["id"], created["id"]);
    assert_eq!(for_admin["items"][0]["is_active"], false);

    let for_guest = expect_json(client.get(api(&listing)), StatusCode::OK).await;
    assert_eq!(for_guest["total"], 0);
}

#[tokio::test]
#[ignore = "Requires running API server, seeded catalog and admin credentials"]
async fn test_order_lookup_by_number() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };
    let user = register(&client).await;
    let product = any_product(&client).await;
    let order = place_order(&client, &user, &product, 1, "cash_on_delivery").await;
    let number = order["order_number"].as_str().unwrap_or_default();

    let found = expect_json(
        client
            .get(api(&format!(
                "/admin/orders/by-number/{}",
                number.to_ascii_lowercase()
            )))
            .header("authorization", admin.bearer()),
        StatusCode::OK,
    )
    .await;
    assert_eq!(found["id"], order["id"]);

    let response = send(
        client
            .get(api("/admin/orders/by-number/ORD-19700101-ZZZZZZ"))
            .header("authorization", admin.bearer()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running API server and admin credentials"]
async fn test_role_management() {
    let client = client();
    let Some(admin) = admin_session(&client).await else {
        return;
    };
    let user = register(&client).await;
    let path = format!("/admin/users/{}/role", user.user["id"]);

    let promoted = expect_json(
        client
            .put(api(&path))
            .header("authorization", admin.bearer())
            .json(&json!({ "role": "admin" })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(promoted["role"], "admin");

    // the token issued before promotion follows the account's current role
    let response = send(
        client
            .get(api("/admin/dashboard"))
            .header("authorization", user.bearer()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    expect_json(
        client
            .put(api(&path))
            .header("authorization", admin.bearer())
            .json(&json!({ "role": "user" })),
        StatusCode::OK,
    )
    .await;
    let response = send(
        client
            .get(api("/admin/dashboard"))
            .header("authorization", user.bearer()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        client
            .delete(api(&format!("/admin/users/{}", user.user["id"])))
            .header("authorization", admin.bearer()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(client.get(api("/auth/me")).header("authorization", user.bearer())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

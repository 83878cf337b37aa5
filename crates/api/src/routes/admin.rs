//! Back-office routes. Every handler requires an admin token.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
};
use chrono::{NaiveTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{OrderId, OrderStatus, Page, UserId, UserRole};

use crate::db::analytics::DashboardSummary;
use crate::db::{AnalyticsRepository, OrderRepository, ProductRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Order, Product, User};
use crate::routes::orders::PageQuery;
use crate::services::CheckoutService;
use crate::services::checkout::is_order_number;
use crate::state::AppState;

/// Stock at or below this counts as low.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/role", put(set_role))
        .route("/orders", get(orders))
        .route("/orders/by-number/{number}", get(order_by_number))
        .route("/orders/{id}/status", put(set_status))
        .route("/orders/{id}/tracking", put(set_tracking))
        .route("/products/low-stock", get(low_stock))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i32>,
}

/// Headline numbers, cached briefly.
async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Arc<DashboardSummary>>> {
    if let Some(cached) = state.dashboard_cache().get(&()).await {
        return Ok(Json(cached));
    }

    let today_start = Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    let summary = Arc::new(
        AnalyticsRepository::new(state.pool())
            .summary(today_start, LOW_STOCK_THRESHOLD)
            .await?,
    );
    state.dashboard_cache().insert((), Arc::clone(&summary)).await;
    Ok(Json(summary))
}

async fn users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<UserQuery>,
) -> Result<Json<Page<User>>> {
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();
    let (users, total) = UserRepository::new(state.pool())
        .list(query.search.as_deref(), params)
        .await?;
    Ok(Json(Page::new(users, total, params)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, user_id = %id))]
async fn set_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>> {
    if id == admin.id {
        return Err(AppError::Conflict(
            "You cannot change your own role".to_string(),
        ));
    }

    let user = UserRepository::new(state.pool()).set_role(id, body.role).await?;
    state.forget_account(id).await;
    tracing::info!(role = ?user.role, "User role changed");
    Ok(Json(user))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id, user_id = %id))]
async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    if id == admin.id {
        return Err(AppError::Conflict(
            "You cannot delete your own account".to_string(),
        ));
    }

    if UserRepository::new(state.pool()).delete(id).await? {
        tracing::info!("User deleted");
        state.forget_account(id).await;
        state.dashboard_cache().invalidate_all();
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("User {id} not found")))
    }
}

async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Page<Order>>> {
    let params = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .params();
    let (orders, total) = OrderRepository::new(state.pool())
        .list(query.status, query.search.as_deref(), params)
        .await?;
    Ok(Json(Page::new(orders, total, params)))
}

/// Look an order up by the number customers quote.
async fn order_by_number(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(number): Path<String>,
) -> Result<Json<Order>> {
    let number = number.trim().to_ascii_uppercase();
    if !is_order_number(&number) {
        return Err(AppError::BadRequest(format!(
            "'{number}' is not an order number"
        )));
    }

    OrderRepository::new(state.pool())
        .get_by_number(&number)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Order {number} not found")))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, order_id = %id))]
async fn set_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let checkout = CheckoutService::new(state.pool(), state.mailer(), state.checkout_settings());
    let order = checkout.update_status(id, body.status).await?;
    if body.status.restocks() {
        state.invalidate_catalog();
    } else {
        state.dashboard_cache().invalidate_all();
    }
    Ok(Json(order))
}

async fn set_tracking(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<TrackingRequest>,
) -> Result<Json<Order>> {
    let tracking = body
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if tracking.is_some_and(|t| t.len() > 100) {
        return Err(AppError::Validation(
            "Tracking number must be at most 100 characters".to_string(),
        ));
    }

    let order = OrderRepository::new(state.pool())
        .set_tracking_number(id, tracking)
        .await?;
    Ok(Json(order))
}

async fn low_stock(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<Product>>> {
    let threshold = query.threshold.unwrap_or(LOW_STOCK_THRESHOLD).max(0);
    Ok(Json(
        ProductRepository::new(state.pool()).low_stock(threshold).await?,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use emporium_core::UserRole;

    use crate::state::test_support::{bearer, test_state};

    #[tokio::test]
    async fn test_dashboard_forbidden_for_customers() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::get("/dashboard")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_cannot_change_own_role() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::put("/users/42/role")
                    .header("authorization", token)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"role":"user"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::delete("/users/42")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_tracking_number_length_checked() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::put("/orders/1/tracking")
                    .header("authorization", token)
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"tracking_number":"{}"}}"#,
                        "9".repeat(101)
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_order_lookup_rejects_malformed_number() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::get("/orders/by-number/12345")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

//! Customer order routes: checkout, history and cancellation.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{OrderId, Page, PageParams};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::services::{CheckoutRequest, CheckoutService};
use crate::state::AppState;

/// Build the order router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(place))
        .route("/{id}", get(show))
        .route("/{id}/cancel", post(cancel))
}

/// `?page=&per_page=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    #[must_use]
    pub fn params(&self) -> PageParams {
        let defaults = PageParams::default();
        PageParams::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

/// Place an order from the caller's cart.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
async fn place(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let checkout = CheckoutService::new(state.pool(), state.mailer(), state.checkout_settings());
    let order = checkout.place_order(&user, body).await?;
    state.dashboard_cache().invalidate_all();
    Ok((StatusCode::CREATED, Json(order)))
}

async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Order>>> {
    let params = query.params();
    let (orders, total) = OrderRepository::new(state.pool())
        .list_for_user(user.id, params)
        .await?;
    Ok(Json(Page::new(orders, total, params)))
}

/// One order. Customers only see their own; admins see any.
async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    OrderRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|o| user.is_admin() || o.belongs_to(user.id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))
}

#[instrument(skip(state, user), fields(user_id = %user.id, order_id = %id))]
async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let checkout = CheckoutService::new(state.pool(), state.mailer(), state.checkout_settings());
    let order = checkout.cancel_order(&user, id).await?;
    state.invalidate_catalog();
    Ok(Json(order))
}

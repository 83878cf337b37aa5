//! Cart routes.
//!
//! The cart belongs to the bearer of the access token when there is one,
//! otherwise to the `X-Session-Id` the client sends. Every mutation answers
//! with the freshly priced cart.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post, put},
};
use serde::Deserialize;

use emporium_core::ProductId;

use crate::error::{AppError, Result};
use crate::middleware::auth::session_id;
use crate::middleware::{CartOwner, RequireAuth};
use crate::models::CartView;
use crate::services::CartService;
use crate::state::AppState;

/// Build the cart router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/items", post(add_item))
        .route(
            "/items/{product_id}",
            put(update_item).delete(remove_item),
        )
        .route("/merge", post(merge))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

fn service(state: &AppState) -> CartService<'_> {
    CartService::new(state.pool(), state.config().currency)
}

async fn show(State(state): State<AppState>, CartOwner(owner): CartOwner) -> Result<Json<CartView>> {
    Ok(Json(service(&state).view(&owner).await?))
}

async fn clear(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state).clear(&owner).await?))
}

async fn add_item(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let view = service(&state)
        .add_item(&owner, body.product_id, body.quantity)
        .await?;
    Ok(Json(view))
}

async fn update_item(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Path(product_id): Path<ProductId>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let view = service(&state)
        .update_item(&owner, product_id, body.quantity)
        .await?;
    Ok(Json(view))
}

async fn remove_item(
    State(state): State<AppState>,
    CartOwner(owner): CartOwner,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state).remove_item(&owner, product_id).await?))
}

/// Fold the anonymous cart named by `X-Session-Id` into the caller's cart.
async fn merge(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
) -> Result<Json<CartView>> {
    let session = session_id(&headers)
        .map_err(|_| AppError::BadRequest("Invalid X-Session-Id header".to_string()))?
        .ok_or_else(|| AppError::BadRequest("X-Session-Id header is required".to_string()))?;

    Ok(Json(service(&state).merge(user.id, &session).await?))
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
    async fn test_cart_needs_an_owner() {
        let response = super::router()
            .with_state(test_state())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_session_id_rejected() {
        let response = super::router()
            .with_state(test_state())
            .oneshot(
                Request::get("/")
                    .header("x-session-id", "no/slashes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_merge_requires_login() {
        let response = super::router()
            .with_state(test_state())
            .oneshot(
                Request::post("/merge")
                    .header("x-session-id", "guest_session_01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_merge_requires_session_header() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::post("/merge")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

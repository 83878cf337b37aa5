//! Catalog routes. Reads are public; writes need an admin token.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::instrument;

use emporium_core::{Page, ProductId};

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::product::FacetCount;
use crate::models::{NewProduct, Product, ProductFilter, ProductUpdate};
use crate::state::{AppState, Facet};

/// Build the product router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/categories", get(categories))
        .route("/brands", get(brands))
        .route("/{id}", get(show).put(update).delete(destroy))
}

/// Search and filter the catalog. Admins may add `include_inactive=true`.
#[instrument(skip(state, user))]
async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Page<Product>>> {
    let filter = filter.normalized().visible_to(user.as_ref());
    let params = filter.page_params();
    let (items, total) = ProductRepository::new(state.pool()).search(&filter).await?;
    Ok(Json(Page::new(items, total, params)))
}

async fn facets(state: &AppState, facet: Facet) -> Result<Arc<Vec<FacetCount>>> {
    if let Some(cached) = state.facet_cache().get(&facet).await {
        return Ok(cached);
    }

    let repo = ProductRepository::new(state.pool());
    let list = Arc::new(match facet {
        Facet::Categories => repo.categories().await?,
        Facet::Brands => repo.brands().await?,
    });
    state.facet_cache().insert(facet, Arc::clone(&list)).await;
    Ok(list)
}

async fn categories(State(state): State<AppState>) -> Result<Json<Arc<Vec<FacetCount>>>> {
    Ok(Json(facets(&state, Facet::Categories).await?))
}

async fn brands(State(state): State<AppState>) -> Result<Json<Arc<Vec<FacetCount>>>> {
    Ok(Json(facets(&state, Facet::Brands).await?))
}

/// Product detail. Admins can see inactive products too.
async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let repo = ProductRepository::new(state.pool());
    let product = if user.is_some_and(|u| u.is_admin()) {
        repo.get(id).await?
    } else {
        repo.get_active(id).await?
    };

    product
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Product {id} not found")))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewProduct>,
) -> Result<impl IntoResponse> {
    let product = body.validate().map_err(AppError::Validation)?;
    let created = ProductRepository::new(state.pool()).create(&product).await?;
    state.invalidate_catalog();

    tracing::info!(product_id = %created.id, "Product created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, product_id = %id))]
async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(body): Json<ProductUpdate>,
) -> Result<Json<Product>> {
    let changes = body.validate().map_err(AppError::Validation)?;
    let repo = ProductRepository::new(state.pool());
    let product = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {id} not found")))?;

    let updated = repo.update(&changes.apply(product)).await?;
    state.invalidate_catalog();
    Ok(Json(updated))
}

/// Deactivate a product. Orders keep their snapshot of it.
#[instrument(skip(state, admin), fields(admin_id = %admin.id, product_id = %id))]
async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool()).delete(id).await?;
    state.invalidate_catalog();
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use emporium_core::UserRole;

    use crate::state::test_support::{bearer, test_state};

    const PRODUCT: &str = r#"{"name":"Lamp","price":"19.99","category":"Home","brand":"Lumo","stock":3}"#;

    #[tokio::test]
    async fn test_create_requires_token() {
        let response = super::router()
            .with_state(test_state())
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(PRODUCT))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_forbidden_for_customers() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::post("/")
                    .header("authorization", token)
                    .header("content-type", "application/json")
                    .body(Body::from(PRODUCT))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_validates_before_database() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::post("/")
                    .header("authorization", token)
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"name":"Lamp","price":"-1","category":"Home","brand":"Lumo","stock":3}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_delete_forbidden_for_customers() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::delete("/7")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

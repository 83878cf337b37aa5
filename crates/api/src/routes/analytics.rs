//! Admin analytics. Each endpoint is one read-only aggregation over a date
//! range, which defaults to the last 30 days.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use emporium_core::analytics::{Period, RevenuePoint};

use crate::db::AnalyticsRepository;
use crate::db::analytics::{
    CategoryShare, DateRange, GeoBucket, HourlyBucket, StatusCount, TopProduct,
};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 366 * 2;
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

/// Build the analytics router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/revenue", get(revenue))
        .route("/top-products", get(top_products))
        .route("/categories", get(categories))
        .route("/hourly", get(hourly))
        .route("/geographic", get(geographic))
        .route("/status", get(status))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period: Period,
    pub limit: Option<i64>,
}

impl AnalyticsQuery {
    /// Resolve the requested range against `now`.
    fn range(&self, now: DateTime<Utc>) -> Result<DateRange> {
        let end = self.to.unwrap_or(now);
        let start = self
            .from
            .unwrap_or_else(|| end - Duration::days(DEFAULT_RANGE_DAYS));

        if start >= end {
            return Err(AppError::Validation(
                "'from' must be before 'to'".to_string(),
            ));
        }
        if end - start > Duration::days(MAX_RANGE_DAYS) {
            return Err(AppError::Validation(format!(
                "Date range must be at most {MAX_RANGE_DAYS} days"
            )));
        }
        Ok(DateRange { start, end })
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

async fn revenue(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<RevenuePoint>>> {
    let range = query.range(Utc::now())?;
    let series = AnalyticsRepository::new(state.pool())
        .revenue_by_period(query.period, range)
        .await?;
    Ok(Json(series))
}

async fn top_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<TopProduct>>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .top_products(range, query.limit())
            .await?,
    ))
}

async fn categories(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<CategoryShare>>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .category_breakdown(range)
            .await?,
    ))
}

async fn hourly(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<HourlyBucket>>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .hourly_breakdown(range)
            .await?,
    ))
}

async fn geographic(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<GeoBucket>>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .geographic_breakdown(range, query.limit())
            .await?,
    ))
}

/// Order counts per status over all time.
async fn status(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<StatusCount>>> {
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .order_status_counts()
            .await?,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    use emporium_core::UserRole;

    use super::AnalyticsQuery;
    use crate::state::test_support::{bearer, test_state};

    #[test]
    fn test_default_range_is_last_thirty_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let range = AnalyticsQuery::default().range(now).unwrap();
        assert_eq!(range.end, now);
        assert_eq!(range.start, now - Duration::days(30));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let now = Utc::now();
        let query = AnalyticsQuery {
            from: Some(now),
            to: Some(now - Duration::days(1)),
            ..AnalyticsQuery::default()
        };
        assert!(query.range(now).is_err());
    }

    #[test]
    fn test_limit_clamped() {
        let query = AnalyticsQuery {
            limit: Some(10_000),
            ..AnalyticsQuery::default()
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(AnalyticsQuery::default().limit(), 10);
    }

    #[tokio::test]
    async fn test_analytics_admin_only() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::get("/revenue")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_bad_period_rejected() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        let response = super::router()
            .with_state(state)
            .oneshot(
                Request::get("/revenue?period=fortnight")
                    .header("authorization", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

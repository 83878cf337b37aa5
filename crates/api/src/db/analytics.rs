//! Read-only aggregation queries for the admin dashboard and analytics.
//!
//! Every query counts only orders whose status counts as revenue, so pending
//! (unpaid), cancelled and returned orders never inflate the numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use emporium_core::analytics::{Period, RevenuePoint, average_order_value, fill_gaps, share_of_total};
use emporium_core::{OrderStatus, ProductId, UserRole, round_money};

use super::{RepositoryError, UserRepository};

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_revenue: Decimal,
    pub total_orders: i64,
    pub average_order_value: Decimal,
    pub revenue_today: Decimal,
    pub orders_today: i64,
    /// Orders waiting for payment.
    pub pending_orders: i64,
    pub total_customers: i64,
    pub active_products: i64,
    pub low_stock_products: i64,
}

/// Best sellers by revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub units: i64,
    pub revenue: Decimal,
}

/// Revenue attributed to one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub units: i64,
    pub revenue: Decimal,
    /// Percentage of revenue in the range.
    pub share: Decimal,
}

/// Orders placed during one hour of the day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub orders: i64,
    pub revenue: Decimal,
}

/// Orders shipped to one country and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct GeoBucket {
    pub country: String,
    pub state: Option<String>,
    pub orders: i64,
    pub revenue: Decimal,
}

/// Number of orders in a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub orders: i64,
}

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// `status IN (...)` over the statuses that count as revenue.
fn revenue_filter() -> String {
    let statuses: Vec<String> = OrderStatus::ALL
        .into_iter()
        .filter(|s| s.counts_as_revenue())
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("status IN ({})", statuses.join(", "))
}

#[derive(sqlx::FromRow)]
struct RevenueRow {
    bucket: DateTime<Utc>,
    revenue: Decimal,
    orders: i64,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    category: String,
    units: i64,
    revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct HourRow {
    hour: i32,
    orders: i64,
    revenue: Decimal,
}

/// Repository for analytics queries.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    /// Create a new analytics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Dashboard headline numbers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn summary(
        &self,
        today_start: DateTime<Utc>,
        low_stock_threshold: i32,
    ) -> Result<DashboardSummary, RepositoryError> {
        let (total_revenue, total_orders, revenue_today, orders_today): (
            Decimal,
            i64,
            Decimal,
            i64,
        ) = sqlx::query_as(&format!(
            r"
            SELECT COALESCE(SUM(total), 0),
                   COUNT(*),
                   COALESCE(SUM(total) FILTER (WHERE created_at >= $1), 0),
                   COUNT(*) FILTER (WHERE created_at >= $1)
            FROM orders
            WHERE {}
            ",
            revenue_filter()
        ))
        .bind(today_start)
        .fetch_one(self.pool)
        .await?;

        let (pending_orders, active_products, low_stock_products): (i64, i64, i64) =
            sqlx::query_as(
                r"
            SELECT (SELECT COUNT(*) FROM orders WHERE status = 'pending'),
                   (SELECT COUNT(*) FROM products WHERE is_active),
                   (SELECT COUNT(*) FROM products WHERE is_active AND stock <= $1)
            ",
            )
            .bind(low_stock_threshold)
            .fetch_one(self.pool)
            .await?;

        let total_customers = UserRepository::new(self.pool)
            .count(Some(UserRole::User))
            .await?;

        Ok(DashboardSummary {
            total_revenue: round_money(total_revenue),
            total_orders,
            average_order_value: average_order_value(total_revenue, total_orders),
            revenue_today: round_money(revenue_today),
            orders_today,
            pending_orders,
            total_customers,
            active_products,
            low_stock_products,
        })
    }

    /// Revenue series with one point per period in the range, including
    /// empty periods.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(period = period.as_sql()))]
    pub async fn revenue_by_period(
        &self,
        period: Period,
        range: DateRange,
    ) -> Result<Vec<RevenuePoint>, RepositoryError> {
        let rows: Vec<RevenueRow> = sqlx::query_as(&format!(
            r"
            SELECT date_trunc($1, created_at AT TIME ZONE 'UTC') AT TIME ZONE 'UTC' AS bucket,
                   SUM(total) AS revenue,
                   COUNT(*) AS orders
            FROM orders
            WHERE {} AND created_at >= $2 AND created_at < $3
            GROUP BY 1
            ORDER BY 1
            ",
            revenue_filter()
        ))
        .bind(period.as_sql())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool)
        .await?;

        let points: Vec<RevenuePoint> = rows
            .into_iter()
            .map(|r| RevenuePoint {
                bucket: r.bucket,
                revenue: round_money(r.revenue),
                orders: r.orders,
            })
            .collect();

        Ok(fill_gaps(&points, range.start, range.end, period))
    }

    /// Products ranked by revenue in the range.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(
        &self,
        range: DateRange,
        limit: i64,
    ) -> Result<Vec<TopProduct>, RepositoryError> {
        let rows = sqlx::query_as(&format!(
            r"
            SELECT (line->>'product_id')::int4 AS product_id,
                   MAX(line->>'name') AS name,
                   SUM((line->>'quantity')::int8)::int8 AS units,
                   SUM((line->>'line_total')::numeric) AS revenue
            FROM orders o, jsonb_array_elements(o.items) AS line
            WHERE {} AND o.created_at >= $1 AND o.created_at < $2
            GROUP BY 1
            ORDER BY revenue DESC, units DESC
            LIMIT $3
            ",
            revenue_filter()
        ))
        .bind(range.start)
        .bind(range.end)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Revenue per product category in the range. Lines whose product no
    /// longer exists are grouped under "Uncategorized".
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn category_breakdown(
        &self,
        range: DateRange,
    ) -> Result<Vec<CategoryShare>, RepositoryError> {
        let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
            r"
            SELECT COALESCE(NULLIF(p.category, ''), 'Uncategorized') AS category,
                   SUM((line->>'quantity')::int8)::int8 AS units,
                   SUM((line->>'line_total')::numeric) AS revenue
            FROM orders o
            CROSS JOIN jsonb_array_elements(o.items) AS line
            LEFT JOIN products p ON p.id = (line->>'product_id')::int4
            WHERE {} AND o.created_at >= $1 AND o.created_at < $2
            GROUP BY 1
            ORDER BY revenue DESC
            ",
            revenue_filter()
        ))
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool)
        .await?;

        Ok(category_shares(rows))
    }

    /// Orders by hour of day (UTC), always 24 buckets.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn hourly_breakdown(
        &self,
        range: DateRange,
    ) -> Result<Vec<HourlyBucket>, RepositoryError> {
        let rows: Vec<HourRow> = sqlx::query_as(&format!(
            r"
            SELECT EXTRACT(HOUR FROM created_at AT TIME ZONE 'UTC')::int4 AS hour,
                   COUNT(*) AS orders,
                   SUM(total) AS revenue
            FROM orders
            WHERE {} AND created_at >= $1 AND created_at < $2
            GROUP BY 1
            ",
            revenue_filter()
        ))
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool)
        .await?;

        Ok(hourly_buckets(rows))
    }

    /// Orders and revenue by shipping country and state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn geographic_breakdown(
        &self,
        range: DateRange,
        limit: i64,
    ) -> Result<Vec<GeoBucket>, RepositoryError> {
        let rows = sqlx::query_as(&format!(
            r"
            SELECT COALESCE(shipping_address->>'country', '??') AS country,
                   NULLIF(shipping_address->>'state', '') AS state,
                   COUNT(*) AS orders,
                   SUM(total) AS revenue
            FROM orders
            WHERE {} AND created_at >= $1 AND created_at < $2
            GROUP BY 1, 2
            ORDER BY revenue DESC, orders DESC
            LIMIT $3
            ",
            revenue_filter()
        ))
        .bind(range.start)
        .bind(range.end)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Order count for every status, including statuses with no orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn order_status_counts(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(self.pool)
                .await?;

        Ok(OrderStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                orders: rows
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, n)| *n),
            })
            .collect())
    }
}

fn category_shares(rows: Vec<CategoryRow>) -> Vec<CategoryShare> {
    let total: Decimal = rows.iter().map(|r| r.revenue).sum();
    rows.into_iter()
        .map(|r| CategoryShare {
            share: share_of_total(r.revenue, total),
            category: r.category,
            units: r.units,
            revenue: round_money(r.revenue),
        })
        .collect()
}

fn hourly_buckets(rows: Vec<HourRow>) -> Vec<HourlyBucket> {
    let mut buckets: Vec<HourlyBucket> = (0..24)
        .map(|hour| HourlyBucket {
            hour,
            orders: 0,
            revenue: Decimal::ZERO,
        })
        .collect();

    for row in rows {
        if let Ok(hour) = usize::try_from(row.hour)
            && let Some(bucket) = buckets.get_mut(hour)
        {
            bucket.orders += row.orders;
            bucket.revenue += round_money(row.revenue);
        }
    }
    buckets
}

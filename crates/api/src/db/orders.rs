//! Order repository.
//!
//! Checkout is the one multi-statement write in the catalog: stock for every
//! line is decremented with a conditional `UPDATE`, the order is inserted
//! and the cart is emptied in the same transaction. A line that cannot be
//! covered aborts the whole order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use emporium_core::{
    CartId, CurrencyCode, OrderId, OrderStatus, OrderTotals, PageParams, PaymentMethod,
    PaymentStatus, ProductId, UserId,
};

use super::RepositoryError;
use super::users::escape_like;
use crate::models::order::{NewOrder, Order, OrderLine};
use crate::models::user::Address;

const ORDER_COLUMNS: &str = "id, order_number, user_id, email, items, subtotal, shipping, \
                             discount, tax, total, currency, shipping_address, billing_address, \
                             payment_method, payment_status, payment_reference, status, \
                             tracking_number, notes, paid_at, shipped_at, delivered_at, \
                             cancelled_at, retention_until, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: Option<UserId>,
    email: String,
    items: Json<Vec<OrderLine>>,
    subtotal: Decimal,
    shipping: Decimal,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    shipping_address: Json<Address>,
    billing_address: Option<Json<Address>>,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    payment_reference: Option<String>,
    status: OrderStatus,
    tracking_number: Option<String>,
    notes: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    retention_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let currency: CurrencyCode = r
            .currency
            .parse()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", r.id)))?;

        let totals = OrderTotals {
            subtotal: r.subtotal,
            shipping: r.shipping,
            discount: r.discount,
            tax: r.tax,
            total: r.total,
        };
        if !totals.is_consistent() {
            return Err(RepositoryError::DataCorruption(format!(
                "order {} totals do not add up",
                r.id
            )));
        }

        Ok(Self {
            id: r.id,
            order_number: r.order_number,
            user_id: r.user_id,
            email: r.email,
            items: r.items.0,
            totals,
            currency,
            shipping_address: r.shipping_address.0,
            billing_address: r.billing_address.map(|a| a.0),
            payment_method: r.payment_method,
            payment_status: r.payment_status,
            payment_reference: r.payment_reference,
            status: r.status,
            tracking_number: r.tracking_number,
            notes: r.notes,
            paid_at: r.paid_at,
            shipped_at: r.shipped_at,
            delivered_at: r.delivered_at,
            cancelled_at: r.cancelled_at,
            retention_until: r.retention_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order: decrement stock for every line, insert the order and
    /// empty the cart it came from, atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InsufficientStock` naming the first line
    /// whose product is inactive or short of stock.
    /// Returns `RepositoryError::Conflict` if the order number is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, order), fields(order_number = %order.order_number, lines = order.items.len()))]
    pub async fn create_from_checkout(
        &self,
        order: &NewOrder,
        cart: CartId,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for line in &order.items {
            let result = sqlx::query(
                r"
                UPDATE products
                SET stock = stock - $1, updated_at = now()
                WHERE id = $2 AND is_active AND stock >= $1
                ",
            )
            .bind(i64::from(line.quantity))
            .bind(line.product_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::InsufficientStock(line.product_id));
            }
        }

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO orders
                (order_number, user_id, email, items, subtotal, shipping, discount, tax, total,
                 currency, shipping_address, billing_address, payment_method, notes,
                 retention_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(&order.email)
        .bind(Json(&order.items))
        .bind(order.totals.subtotal)
        .bind(order.totals.shipping)
        .bind(order.totals.discount)
        .bind(order.totals.tax)
        .bind(order.totals.total)
        .bind(order.currency.code())
        .bind(Json(&order.shipping_address))
        .bind(order.billing_address.as_ref().map(Json))
        .bind(order.payment_method)
        .bind(order.notes.as_deref())
        .bind(order.retention_until)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "order number"))?;

        sqlx::query("UPDATE carts SET items = '[]'::jsonb, updated_at = now() WHERE id = $1")
            .bind(cart)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(Order::try_from).transpose()
    }

    /// Get an order by its public order number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_number(&self, number: &str) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user: UserId,
        page: PageParams,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user)
            .fetch_one(self.pool)
            .await?;

        Ok((into_orders(rows)?, total.0))
    }

    /// All orders, newest first, optionally filtered by status and by a
    /// search term matching the order number or email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
        page: PageParams,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR order_number ILIKE $2 OR email ILIKE $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(status)
        .bind(pattern.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR order_number ILIKE $2 OR email ILIKE $2)
            ",
        )
        .bind(status)
        .bind(pattern.as_deref())
        .fetch_one(self.pool)
        .await?;

        Ok((into_orders(rows)?, total.0))
    }

    /// Move an order from `from` to `to`, stamping the matching timestamp
    /// and restoring stock when `to` restocks.
    ///
    /// The caller checks that the edge is legal; this only guards against
    /// a concurrent change by matching on `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order is no longer in `from`.
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[instrument(skip(self), fields(order_id = %id, from = %from.as_str(), to = %to.as_str()))]
    pub async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE orders
            SET status = $3,
                payment_status = CASE WHEN $3 = 'paid'::order_status
                                      THEN 'paid'::payment_status ELSE payment_status END,
                paid_at = CASE WHEN $3 = 'paid'::order_status
                               THEN COALESCE(paid_at, now()) ELSE paid_at END,
                shipped_at = CASE WHEN $3 = 'shipped'::order_status THEN now() ELSE shipped_at END,
                delivered_at = CASE WHEN $3 = 'delivered'::order_status
                                    THEN now() ELSE delivered_at END,
                cancelled_at = CASE WHEN $3 = 'cancelled'::order_status
                                    THEN now() ELSE cancelled_at END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(RepositoryError::Conflict(format!(
                "order {id} is no longer {}",
                from.as_str()
            )));
        };
        let order = Order::try_from(row)?;

        if to.restocks() {
            restock(&mut tx, &order.items).await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Record a payment outcome reported by a provider. A successful
    /// payment advances a pending order to `paid`. Repeated notifications
    /// are harmless.
    ///
    /// # Returns
    ///
    /// The updated order, or `None` if no order carries `reference`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn mark_payment(
        &self,
        reference: &str,
        outcome: PaymentStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = match outcome {
            PaymentStatus::Paid => {
                sqlx::query_as(&format!(
                    r"
                    UPDATE orders
                    SET payment_status = 'paid',
                        paid_at = COALESCE(paid_at, now()),
                        status = CASE WHEN status = 'pending' THEN 'paid'::order_status
                                      ELSE status END,
                        updated_at = now()
                    WHERE payment_reference = $1
                    RETURNING {ORDER_COLUMNS}
                    "
                ))
                .bind(reference)
                .fetch_optional(self.pool)
                .await?
            }
            other => {
                // Never downgrade a settled payment.
                sqlx::query_as(&format!(
                    r"
                    UPDATE orders
                    SET payment_status = CASE WHEN payment_status = 'pending'
                                              THEN $2 ELSE payment_status END,
                        updated_at = now()
                    WHERE payment_reference = $1
                    RETURNING {ORDER_COLUMNS}
                    "
                ))
                .bind(reference)
                .bind(other)
                .fetch_optional(self.pool)
                .await?
            }
        };

        row.map(Order::try_from).transpose()
    }

    /// Attach a provider reference (payment intent or `PayPal` order id)
    /// to an order that has not been paid yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order is already paid or
    /// no longer pending, or the reference belongs to another order.
    pub async fn set_payment_reference(
        &self,
        id: OrderId,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE orders
            SET payment_method = $2, payment_reference = $3, updated_at = now()
            WHERE id = $1 AND status = 'pending' AND payment_status <> 'paid'
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(method)
        .bind(reference)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "payment reference"))?;

        row.ok_or_else(|| RepositoryError::Conflict(format!("order {id} is not awaiting payment")))?
            .try_into()
    }

    /// Set or clear the carrier tracking number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_tracking_number(
        &self,
        id: OrderId,
        tracking: Option<&str>,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE orders SET tracking_number = $2, updated_at = now()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(tracking)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Strip personal data from orders whose retention date has passed.
    ///
    /// The email is replaced, addresses are reduced to country and state
    /// (kept for geographic analytics) and notes are dropped. With
    /// `dry_run` nothing is changed and the number of affected orders is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn anonymize_expired(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<u64, RepositoryError> {
        if dry_run {
            let count: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM orders WHERE retention_until <= $1 AND anonymized_at IS NULL",
            )
            .bind(now)
            .fetch_one(self.pool)
            .await?;
            return Ok(u64::try_from(count.0).unwrap_or_default());
        }

        let result = sqlx::query(
            r"
            UPDATE orders
            SET email = 'anonymized-' || id || '@invalid',
                shipping_address = jsonb_build_object(
                    'country', COALESCE(shipping_address->>'country', ''),
                    'state', COALESCE(shipping_address->>'state', '')
                ),
                billing_address = CASE WHEN billing_address IS NULL THEN NULL
                                       ELSE jsonb_build_object(
                                           'country', COALESCE(billing_address->>'country', ''),
                                           'state', COALESCE(billing_address->>'state', '')
                                       ) END,
                notes = NULL,
                user_id = NULL,
                anonymized_at = $1,
                updated_at = now()
            WHERE retention_until <= $1 AND anonymized_at IS NULL
            ",
        )
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn restock(conn: &mut PgConnection, lines: &[OrderLine]) -> Result<(), RepositoryError> {
    let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
    let quantities: Vec<i32> = lines
        .iter()
        .map(|l| i32::try_from(l.quantity).unwrap_or(i32::MAX))
        .collect();

    sqlx::query(
        r"
        UPDATE products p
        SET stock = p.stock + r.qty, updated_at = now()
        FROM (
            SELECT id, SUM(qty) AS qty
            FROM UNNEST($1::int4[], $2::int4[]) AS t(id, qty)
            GROUP BY id
        ) r
        WHERE p.id = r.id
        ",
    )
    .bind(&ids)
    .bind(&quantities)
    .execute(conn)
    .await?;

    Ok(())
}

//! Checkout and order lifecycle.
//!
//! Placing an order prices the cart against the live catalog, freezes the
//! priced lines into the order and hands everything to
//! [`OrderRepository::create_from_checkout`], which decrements stock and
//! clears the cart in one transaction. The confirmation email goes out
//! after commit and never fails the order.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use emporium_core::{
    CurrencyCode, LineAmount, OrderId, OrderStatus, OrderTotals, PaymentMethod, PricingRules,
    ProductId, StatusError,
};

use crate::db::{CartRepository, OrderRepository, ProductRepository, RepositoryError, UserRepository};
use crate::models::cart::{CartLine, CartOwnerKey};
use crate::models::order::{NewOrder, Order, OrderLine};
use crate::models::product::Product;
use crate::models::user::{Address, CurrentUser};
use crate::services::email::Mailer;

/// Attempts at finding an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

const ORDER_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Errors that can occur while placing or changing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("only {available} of product {product_id} in stock")]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
    },

    #[error("a shipping address is required")]
    MissingAddress,

    #[error("{0}")]
    InvalidAddress(String),

    #[error("order not found")]
    OrderNotFound,

    #[error("order can no longer be cancelled (status: {})", .0.as_str())]
    NotCancellable(OrderStatus),

    #[error(transparent)]
    InvalidTransition(#[from] StatusError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Checkout payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Defaults to the default address in the user's address book.
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Store-wide checkout settings.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutSettings {
    pub pricing: PricingRules,
    pub currency: CurrencyCode,
    pub retention_days: i64,
}

/// Checkout operations for one request.
pub struct CheckoutService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
    orders: OrderRepository<'a>,
    users: UserRepository<'a>,
    mailer: &'a Mailer,
    settings: CheckoutSettings,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, mailer: &'a Mailer, settings: CheckoutSettings) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
            orders: OrderRepository::new(pool),
            users: UserRepository::new(pool),
            mailer,
            settings,
        }
    }

    /// Turn the user's cart into an order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if there is nothing to order.
    /// Returns `CheckoutError::ProductUnavailable` or
    /// `CheckoutError::InsufficientStock` if a line cannot be covered, in
    /// which case nothing is written.
    /// Returns `CheckoutError::MissingAddress` or
    /// `CheckoutError::InvalidAddress` for address problems.
    #[instrument(skip(self, user, request), fields(user_id = %user.id))]
    pub async fn place_order(
        &self,
        user: &CurrentUser,
        request: CheckoutRequest,
    ) -> Result<Order, CheckoutError> {
        let cart = self
            .carts
            .find_by_owner(&CartOwnerKey::User(user.id))
            .await?
            .filter(|c| !c.items.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        let ids: Vec<ProductId> = cart.items.iter().map(|l| l.product_id).collect();
        let products = self.products.get_many(&ids).await?;
        let items = build_snapshot(&cart.items, &products)?;

        let account = self
            .users
            .get_by_id(user.id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let shipping_address = resolve_address(request.shipping_address, &account.addresses)?;
        let billing_address = request
            .billing_address
            .map(|a| a.validate().map(|()| a.normalized()))
            .transpose()
            .map_err(CheckoutError::InvalidAddress)?;

        let amounts: Vec<LineAmount> = items
            .iter()
            .map(|l| LineAmount::new(l.unit_price, l.quantity))
            .collect();
        let totals = OrderTotals::compute(&amounts, &self.settings.pricing, Decimal::ZERO);

        let now = Utc::now();
        let mut new_order = NewOrder {
            order_number: generate_order_number(now),
            user_id: user.id,
            email: account.email.as_str().to_string(),
            items,
            totals,
            currency: self.settings.currency,
            shipping_address,
            billing_address,
            payment_method: request.payment_method,
            notes: request
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            retention_until: now + Duration::days(self.settings.retention_days),
        };

        let mut attempt = 1;
        let order = loop {
            match self.orders.create_from_checkout(&new_order, cart.id).await {
                Ok(order) => break order,
                Err(RepositoryError::Conflict(_)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    attempt += 1;
                    new_order.order_number = generate_order_number(now);
                }
                Err(RepositoryError::InsufficientStock(product_id)) => {
                    let available = products
                        .iter()
                        .find(|p| p.id == product_id)
                        .map_or(0, |p| p.stock.max(0));
                    return Err(CheckoutError::InsufficientStock {
                        product_id,
                        available,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            "Order placed"
        );

        if let Err(e) = self.mailer.send_order_confirmation(&order).await {
            warn!(order_id = %order.id, error = %e, "Failed to send order confirmation");
        }

        Ok(order)
    }

    /// Cancel one of the caller's own orders.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order doesn't exist or
    /// belongs to someone else.
    /// Returns `CheckoutError::NotCancellable` once processing has started.
    #[instrument(skip(self, user), fields(user_id = %user.id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        user: &CurrentUser,
        order_id: OrderId,
    ) -> Result<Order, CheckoutError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .filter(|o| o.belongs_to(user.id))
            .ok_or(CheckoutError::OrderNotFound)?;

        if !order.status.is_customer_cancellable() {
            return Err(CheckoutError::NotCancellable(order.status));
        }

        self.apply_transition(&order, OrderStatus::Cancelled).await
    }

    /// Move any order along its lifecycle (admin).
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order doesn't exist.
    /// Returns `CheckoutError::InvalidTransition` for an illegal edge.
    #[instrument(skip(self), fields(order_id = %order_id, to = %next.as_str()))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, CheckoutError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;

        self.apply_transition(&order, next).await
    }

    async fn apply_transition(
        &self,
        order: &Order,
        next: OrderStatus,
    ) -> Result<Order, CheckoutError> {
        let next = order.status.transition(next)?;
        let updated = self.orders.update_status(order.id, order.status, next).await?;

        info!(
            order_id = %updated.id,
            from = %order.status.as_str(),
            to = %next.as_str(),
            "Order status changed"
        );

        if let Err(e) = self.mailer.send_status_update(&updated).await {
            warn!(order_id = %updated.id, error = %e, "Failed to send status update");
        }

        Ok(updated)
    }
}

/// Freeze cart lines into priced order lines.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` for an empty cart, and
/// `CheckoutError::ProductUnavailable` / `CheckoutError::InsufficientStock`
/// for the first line that cannot be sold.
pub fn build_snapshot(
    lines: &[CartLine],
    products: &[Product],
) -> Result<Vec<OrderLine>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    lines
        .iter()
        .map(|line| {
            let product = by_id
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or(CheckoutError::ProductUnavailable(line.product_id))?;

            if !product.can_fulfil(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product.id,
                    available: product.stock.max(0),
                });
            }

            Ok(OrderLine {
                product_id: product.id,
                name: product.name.clone(),
                sku: product.sku.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total: LineAmount::new(product.price, line.quantity).total(),
                image_url: product.thumbnail().map(str::to_string),
            })
        })
        .collect()
}

fn resolve_address(given: Option<Address>, book: &[Address]) -> Result<Address, CheckoutError> {
    let address = match given {
        Some(address) => address,
        None => book
            .iter()
            .find(|a| a.is_default)
            .or_else(|| book.first())
            .cloned()
            .ok_or(CheckoutError::MissingAddress)?,
    };
    address.validate().map_err(CheckoutError::InvalidAddress)?;
    Ok(address.normalized())
}

/// `ORD-YYYYMMDD-XXXXXX` with six random upper-case letters and digits.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .filter_map(|_| ORDER_NUMBER_CHARSET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect();
    format!("ORD-{}-{suffix}", now.format("%Y%m%d"))
}

/// Whether `s` has the shape of a generated order number.
#[must_use]
pub fn is_order_number(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("ORD-") else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('-') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == 6
        && suffix.bytes().all(|b| ORDER_NUMBER_CHARSET.contains(&b))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn product(id: i32, price: Decimal, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            price,
            category: String::new(),
            brand: String::new(),
            sku: Some(format!("SKU-{id}")),
            stock,
            is_active: true,
            image_urls: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(id: i32, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
            added_at: Utc::now(),
        }
    }

    fn address() -> Address {
        Address {
            full_name: "Ada Lovelace".into(),
            line1: "1 Analytical Way".into(),
            city: "London".into(),
            postal_code: "N1".into(),
            country: "gb".into(),
            ..Address::default()
        }
    }

    #[test]
    fn test_snapshot_freezes_prices() {
        let products = vec![product(1, Decimal::new(1999, 2), 10)];
        let items = build_snapshot(&[line(1, 3)], &products).unwrap();

        let first = items.first().unwrap();
        assert_eq!(first.unit_price, Decimal::new(1999, 2));
        assert_eq!(first.line_total, Decimal::new(5997, 2));
        assert_eq!(first.sku.as_deref(), Some("SKU-1"));
    }

    #[test]
    fn test_snapshot_rejects_insufficient_stock() {
        let products = vec![product(1, Decimal::ONE, 2)];
        let err = build_snapshot(&[line(1, 3)], &products).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientStock { available: 2, .. }
        ));
    }

    #[test]
    fn test_snapshot_rejects_inactive_and_missing() {
        let mut inactive = product(1, Decimal::ONE, 5);
        inactive.is_active = false;

        assert!(matches!(
            build_snapshot(&[line(1, 1)], &[inactive]),
            Err(CheckoutError::ProductUnavailable(_))
        ));
        assert!(matches!(
            build_snapshot(&[line(2, 1)], &[]),
            Err(CheckoutError::ProductUnavailable(_))
        ));
        assert!(matches!(
            build_snapshot(&[], &[]),
            Err(CheckoutError::EmptyCart)
        ));
    }

    #[test]
    fn test_snapshot_totals_add_up() {
        let products = vec![
            product(1, Decimal::new(1250, 2), 10),
            product(2, Decimal::new(333, 2), 10),
        ];
        let items = build_snapshot(&[line(1, 2), line(2, 3)], &products).unwrap();
        let amounts: Vec<LineAmount> = items
            .iter()
            .map(|l| LineAmount::new(l.unit_price, l.quantity))
            .collect();
        let totals = OrderTotals::compute(&amounts, &PricingRules::default(), Decimal::ZERO);

        assert_eq!(totals.subtotal, Decimal::new(3499, 2));
        assert_eq!(totals.shipping, Decimal::new(599, 2));
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let number = generate_order_number(now);

        assert!(number.starts_with("ORD-20260307-"));
        let suffix = number.trim_start_matches("ORD-20260307-");
        assert_eq!(suffix.len(), 6);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        assert!(is_order_number(&number));
    }

    #[test]
    fn test_is_order_number() {
        assert!(is_order_number("ORD-20260307-A1B2C3"));
        assert!(!is_order_number("ORD-20260307-a1b2c3"));
        assert!(!is_order_number("ORD-2026037-A1B2C3"));
        assert!(!is_order_number("ORD-20260307-A1B2C"));
        assert!(!is_order_number("INV-20260307-A1B2C3"));
        assert!(!is_order_number("42"));
    }

    #[test]
    fn test_resolve_address_falls_back_to_default() {
        let mut home = address();
        home.is_default = true;
        home.city = "Paris".into();

        let resolved = resolve_address(None, &[address(), home]).unwrap();
        assert_eq!(resolved.city, "Paris");
        assert_eq!(resolved.country, "GB");

        assert!(matches!(
            resolve_address(None, &[]),
            Err(CheckoutError::MissingAddress)
        ));
    }

    #[test]
    fn test_resolve_address_validates() {
        let mut bad = address();
        bad.country = "Britain".into();
        assert!(matches!(
            resolve_address(Some(bad), &[]),
            Err(CheckoutError::InvalidAddress(_))
        ));
    }
}

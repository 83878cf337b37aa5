//! Cart domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::{CartId, CurrencyCode, ProductId, UserId};

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwnerKey {
    /// A signed-in user.
    User(UserId),
    /// An anonymous visitor, identified by the `X-Session-Id` header.
    Session(String),
}

/// One stored cart line. Prices are never stored in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// A stored cart.
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwnerKey,
    pub items: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line priced at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    pub image_url: Option<String>,
    /// Units currently available.
    pub stock: i32,
    /// False when the product was deactivated or stock fell below the
    /// requested quantity since the line was added.
    pub available: bool,
}

/// A cart as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub currency: CurrencyCode,
}

impl CartView {
    #[must_use]
    pub fn empty(currency: CurrencyCode) -> Self {
        Self {
            items: Vec::new(),
            item_count: 0,
            subtotal: Decimal::ZERO,
            currency,
        }
    }
}

//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::{
    CurrencyCode, OrderId, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus, ProductId,
    UserId,
};

use super::user::Address;

/// A line frozen at checkout time. Later price changes do not affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub email: String,
    pub items: Vec<OrderLine>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub currency: CurrencyCode,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub retention_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether `user` placed this order.
    #[must_use]
    pub fn belongs_to(&self, user: UserId) -> bool {
        self.user_id == Some(user)
    }
}

/// Everything needed to insert an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: UserId,
    pub email: String,
    pub items: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub currency: CurrencyCode,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub retention_until: DateTime<Utc>,
}

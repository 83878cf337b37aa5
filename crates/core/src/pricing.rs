//! Order total computation.
//!
//! The single invariant every stored order satisfies:
//!
//! ```text
//! total = subtotal + shipping - discount + tax
//! ```
//!
//! Every component is rounded to cents before it is summed, so the stored
//! columns always add up exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::round_money;

/// Store-wide pricing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Tax rate as a fraction (0.08 = 8%).
    pub tax_rate: Decimal,
    /// Shipping charged below the free-shipping threshold.
    pub shipping_flat_rate: Decimal,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            shipping_flat_rate: Decimal::new(599, 2),
            free_shipping_threshold: Decimal::new(50, 0),
        }
    }
}

impl PricingRules {
    /// Shipping for a given merchandise subtotal.
    ///
    /// Empty orders ship for free.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO || subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            round_money(self.shipping_flat_rate)
        }
    }

    /// Tax on the discounted merchandise amount.
    #[must_use]
    pub fn tax_for(&self, taxable: Decimal) -> Decimal {
        round_money(taxable.max(Decimal::ZERO) * self.tax_rate)
    }
}

/// A priced line: unit price times quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineAmount {
    #[must_use]
    pub const fn new(unit_price: Decimal, quantity: u32) -> Self {
        Self {
            unit_price,
            quantity,
        }
    }

    /// `unit_price × quantity`, rounded to cents.
    #[must_use]
    pub fn total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }
}

/// Sum of line totals.
#[must_use]
pub fn subtotal<'a>(lines: impl IntoIterator<Item = &'a LineAmount>) -> Decimal {
    lines.into_iter().map(LineAmount::total).sum()
}

/// The money columns of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Price a set of lines under `rules`.
    ///
    /// The discount is clamped to `[0, subtotal]` and tax is charged on the
    /// discounted amount. Shipping is decided on the undiscounted subtotal.
    #[must_use]
    pub fn compute(lines: &[LineAmount], rules: &PricingRules, discount: Decimal) -> Self {
        let subtotal = subtotal(lines);
        let discount = clamp_discount(discount, subtotal);
        let shipping = rules.shipping_for(subtotal);
        let tax = rules.tax_for(subtotal - discount);
        Self::from_parts(subtotal, shipping, discount, tax)
    }

    /// Build totals from explicit components, deriving `total`.
    ///
    /// Used when an admin edits fee fields on an existing order: the
    /// components are taken as given (after rounding and clamping) and the
    /// total is recomputed so the invariant holds.
    #[must_use]
    pub fn from_parts(
        subtotal: Decimal,
        shipping: Decimal,
        discount: Decimal,
        tax: Decimal,
    ) -> Self {
        let subtotal = round_money(subtotal.max(Decimal::ZERO));
        let shipping = round_money(shipping.max(Decimal::ZERO));
        let discount = clamp_discount(discount, subtotal);
        let tax = round_money(tax.max(Decimal::ZERO));
        Self {
            subtotal,
            shipping,
            discount,
            tax,
            total: subtotal + shipping - discount + tax,
        }
    }

    /// Whether the stored components add up to the stored total.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.shipping - self.discount + self.tax
    }
}

fn clamp_discount(discount: Decimal, subtotal: Decimal) -> Decimal {
    round_money(discount.max(Decimal::ZERO).min(subtotal))
}

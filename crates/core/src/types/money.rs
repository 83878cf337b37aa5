//! Money helpers over `rust_decimal`.
//!
//! Amounts are stored in the currency's standard unit (dollars, not cents)
//! with two decimal places. Payment providers want minor units, see
//! [`to_minor_units`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places kept for every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to cents, half away from zero.
///
/// ```
/// use emporium_core::round_money;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round_money(Decimal::new(10_005, 3)), Decimal::new(1001, 2));
/// ```
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount to integer minor units (e.g. cents).
///
/// Returns `None` if the amount is negative or does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

/// ISO 4217 currency codes accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Upper-case ISO code (`"USD"`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    /// Display symbol used in emails.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Format an amount for display (e.g., "$19.99").
    #[must_use]
    pub fn format(self, amount: Decimal) -> String {
        format!("{}{:.2}", self.symbol(), round_money(amount))
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

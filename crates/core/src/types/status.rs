//! Status enums for orders and payments.
//!
//! # Order lifecycle
//!
//! ```text
//! pending ──► paid ──► processing ──► shipped ──► delivered ──► returned
//!    │          │           │
//!    └──────────┴───────────┴──► cancelled
//! ```
//!
//! `cancelled` and `returned` are terminal. Both put the ordered quantities
//! back into stock.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected order status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot change order status from {from} to {to}")]
pub struct StatusError {
    /// Current status.
    pub from: OrderStatus,
    /// Requested status.
    pub to: OrderStatus,
}

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::Returned,
    ];

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Self-transitions are never legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
                | (Self::Delivered, Self::Returned)
        )
    }

    /// Validate a status change.
    ///
    /// # Errors
    ///
    /// Returns `StatusError` if the lifecycle does not allow the change.
    pub const fn transition(self, next: Self) -> Result<Self, StatusError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusError {
                from: self,
                to: next,
            })
        }
    }

    /// No further status changes are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }

    /// Customers may cancel their own order until it is being processed.
    #[must_use]
    pub const fn is_customer_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }

    /// Entering this status puts the ordered quantities back into stock.
    #[must_use]
    pub const fn restocks(self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }

    /// Orders in this status count towards revenue.
    #[must_use]
    pub const fn counts_as_revenue(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Processing | Self::Shipped | Self::Delivered
        )
    }

    /// Snake-case name, as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    CashOnDelivery,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stripe => write!(f, "stripe"),
            Self::Paypal => write!(f, "paypal"),
            Self::CashOnDelivery => write!(f, "cash_on_delivery"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Returned,
        ];
        for pair in path.windows(2) {
            if let [from, to] = pair {
                assert!(from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_cancellation_window() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_self_transitions_rejected() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_skipping_steps_rejected() {
        assert_eq!(
            OrderStatus::Pending.transition(OrderStatus::Shipped),
            Err(StatusError {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            })
        );
        assert!(OrderStatus::Paid.transition(OrderStatus::Delivered).is_err());
        assert!(OrderStatus::Shipped.transition(OrderStatus::Paid).is_err());
    }

    #[test]
    fn test_status_error_message() {
        let err = OrderStatus::Delivered
            .transition(OrderStatus::Pending)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot change order status from delivered to pending"
        );
    }

    #[test]
    fn test_customer_cancellable() {
        assert!(OrderStatus::Pending.is_customer_cancellable());
        assert!(OrderStatus::Paid.is_customer_cancellable());
        assert!(!OrderStatus::Processing.is_customer_cancellable());
    }

    #[test]
    fn test_revenue_statuses() {
        assert!(!OrderStatus::Pending.counts_as_revenue());
        assert!(OrderStatus::Delivered.counts_as_revenue());
        assert!(!OrderStatus::Cancelled.counts_as_revenue());
        assert!(!OrderStatus::Returned.counts_as_revenue());
    }

    #[test]
    fn test_parse_and_serde_agree() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(&status).unwrap_or_default();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
    }
}

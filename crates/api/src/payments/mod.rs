//! Payment provider clients.
//!
//! Thin wrappers over the Stripe and `PayPal` REST APIs. Both providers
//! report outcomes through webhooks; each client verifies its provider's
//! signature scheme and normalises the event into a [`WebhookEvent`] so the
//! webhook handlers can reconcile orders the same way.

mod error;
pub mod paypal;
pub mod stripe;

pub use error::PaymentError;
pub use paypal::PayPalClient;
pub use stripe::StripeClient;

/// A provider event reduced to what order reconciliation needs.
///
/// `reference` is the provider's id for the payment that was attached to
/// the order when payment started (Stripe payment intent id, `PayPal`
/// order id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { reference: String },
    PaymentFailed { reference: String },
    Ignored { kind: String },
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "helloo"));
    }
}

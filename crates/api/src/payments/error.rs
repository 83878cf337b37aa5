//! Payment provider errors.

use thiserror::Error;

/// Errors that can occur when talking to a payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider is not configured on this server.
    #[error("{0} payments are not enabled")]
    NotConfigured(&'static str),

    /// HTTP request failed.
    #[error("payment request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider rejected the call.
    #[error("payment provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a provider response.
    #[error("payment response error: {0}")]
    Response(String),

    /// Webhook signature missing, malformed or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Amount cannot be expressed in minor units.
    #[error("amount out of range")]
    AmountOutOfRange,
}

//! Stripe REST client.
//!
//! Payment intents are created server-side with the order total in minor
//! units; the client confirms them with the returned `client_secret`.
//! Webhook signatures follow
//! <https://docs.stripe.com/webhooks#verify-manually>.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument};

use emporium_core::{CurrencyCode, OrderId};

use super::{PaymentError, WebhookEvent, constant_time_compare};
use crate::config::StripeConfig;

/// Stripe API base URL.
const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// The fields of a payment intent this API uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

impl PaymentIntent {
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// A webhook event as delivered by Stripe.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Reduce to the outcome for the referenced payment intent.
    #[must_use]
    pub fn normalize(&self) -> WebhookEvent {
        let reference = self
            .data
            .object
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match (self.kind.as_str(), reference) {
            ("payment_intent.succeeded", Some(reference)) => {
                WebhookEvent::PaymentSucceeded { reference }
            }
            ("payment_intent.payment_failed" | "payment_intent.canceled", Some(reference)) => {
                WebhookEvent::PaymentFailed { reference }
            }
            _ => WebhookEvent::Ignored {
                kind: self.kind.clone(),
            },
        }
    }
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
    publishable_key: Option<String>,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Request` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            publishable_key: config.publishable_key.clone(),
        })
    }

    /// Publishable key for the browser, if configured.
    #[must_use]
    pub fn publishable_key(&self) -> Option<&str> {
        self.publishable_key.as_deref()
    }

    /// Create a payment intent for an order.
    ///
    /// The idempotency key is derived from the order and amount, so asking
    /// twice for the same order returns the same intent.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_payment_intent(
        &self,
        order_id: OrderId,
        order_number: &str,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError> {
        let amount = amount_minor.to_string();
        let order_id_str = order_id.to_string();
        let currency_code = currency.code().to_ascii_lowercase();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency_code.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[order_id]", order_id_str.as_str()),
            ("metadata[order_number]", order_number),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("order-{order_id}-{amount_minor}"))
            .form(&params)
            .send()
            .await?;

        let intent: PaymentIntent = handle_response(response).await?;
        debug!(payment_intent = %intent.id, "Payment intent created");
        Ok(intent)
    }

    /// Fetch a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if Stripe rejects the request.
    #[instrument(skip(self))]
    pub async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!("{STRIPE_API_BASE}/payment_intents/{id}"))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        handle_response(response).await
    }

    /// Verify a webhook delivery and parse its event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` if verification fails and
    /// `PaymentError::Response` if the body is not a Stripe event.
    pub fn verify_webhook(
        &self,
        payload: &str,
        signature_header: &str,
    ) -> Result<StripeEvent, PaymentError> {
        verify_stripe_signature(
            self.webhook_secret.expose_secret(),
            payload,
            signature_header,
            chrono::Utc::now().timestamp(),
        )?;

        serde_json::from_str(payload)
            .map_err(|e| PaymentError::Response(format!("invalid Stripe event: {e}")))
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| PaymentError::Response(e.to_string()));
    }

    let message = response
        .json::<StripeErrorBody>()
        .await
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| "unknown error".to_string());

    Err(PaymentError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
///
/// The signed payload is `"{t}.{body}"`, HMAC-SHA256 with the endpoint
/// secret. Any `v1` entry may match; `t` must be within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now`.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` describing the failure.
pub fn verify_stripe_signature(
    secret: &str,
    payload: &str,
    header: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_string()))?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if signatures
        .iter()
        .any(|sig| constant_time_compare(&expected, sig))
    {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_767_225_600;

    fn sign(payload: &str, ts: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{ts}.{payload}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = format!("t={NOW},v1={}", sign(payload, NOW));
        assert!(verify_stripe_signature(SECRET, payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = format!("t={NOW},v1=deadbeef,v1={},v0=ignored", sign(payload, NOW));
        assert!(verify_stripe_signature(SECRET, payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = format!("t={NOW},v1={}", sign(r#"{"amount":100}"#, NOW));
        assert!(matches!(
            verify_stripe_signature(SECRET, r#"{"amount":1}"#, &header, NOW),
            Err(PaymentError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = "{}";
        let header = format!("t={NOW},v1={}", sign(payload, NOW));
        assert!(verify_stripe_signature(SECRET, payload, &header, NOW + 301).is_err());
        assert!(verify_stripe_signature(SECRET, payload, &header, NOW + 300).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        assert!(verify_stripe_signature(SECRET, "{}", "", NOW).is_err());
        assert!(verify_stripe_signature(SECRET, "{}", "v1=abc", NOW).is_err());
        assert!(verify_stripe_signature(SECRET, "{}", &format!("t={NOW}"), NOW).is_err());
        assert!(verify_stripe_signature(SECRET, "{}", "t=soon,v1=abc", NOW).is_err());
    }

    #[test]
    fn test_event_normalization() {
        let succeeded: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#,
        )
        .unwrap();
        assert_eq!(
            succeeded.normalize(),
            WebhookEvent::PaymentSucceeded {
                reference: "pi_123".into()
            }
        );

        let failed: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_2","type":"payment_intent.payment_failed","data":{"object":{"id":"pi_9"}}}"#,
        )
        .unwrap();
        assert_eq!(
            failed.normalize(),
            WebhookEvent::PaymentFailed {
                reference: "pi_9".into()
            }
        );

        let other: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_3","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#,
        )
        .unwrap();
        assert!(matches!(other.normalize(), WebhookEvent::Ignored { .. }));
    }
}

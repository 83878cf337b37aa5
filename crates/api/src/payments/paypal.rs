//! `PayPal` Orders v2 client.
//!
//! Flow: create a `PayPal` order for the store order, send the customer to
//! the approval link, then capture once they return. Webhook deliveries are
//! verified by asking `PayPal` to check the transmission signature.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{PaymentError, WebhookEvent};
use crate::config::PayPalConfig;
use crate::models::Order;

/// Seconds shaved off a token's lifetime before it is refreshed.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PayPalErrorBody {
    message: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

/// A created `PayPal` order awaiting buyer approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    pub approve_url: Option<String>,
}

/// Result of capturing an approved order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayPalCapture {
    pub id: String,
    pub status: String,
}

impl PayPalCapture {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// Transmission headers `PayPal` sends with each webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

impl WebhookHeaders {
    /// Read the `paypal-*` headers.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` naming the first missing header.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Result<Self, PaymentError> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| PaymentError::InvalidSignature(format!("missing {name} header")))
        };

        Ok(Self {
            auth_algo: get("paypal-auth-algo")?,
            cert_url: get("paypal-cert-url")?,
            transmission_id: get("paypal-transmission-id")?,
            transmission_sig: get("paypal-transmission-sig")?,
            transmission_time: get("paypal-transmission-time")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verification_status: String,
}

/// A webhook event as delivered by `PayPal`.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

impl PayPalEvent {
    /// Reduce to the outcome for the `PayPal` order the capture belongs to.
    #[must_use]
    pub fn normalize(&self) -> WebhookEvent {
        let reference = self
            .resource
            .pointer("/supplementary_data/related_ids/order_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match (self.event_type.as_str(), reference) {
            ("PAYMENT.CAPTURE.COMPLETED", Some(reference)) => {
                WebhookEvent::PaymentSucceeded { reference }
            }
            ("PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED", Some(reference)) => {
                WebhookEvent::PaymentFailed { reference }
            }
            _ => WebhookEvent::Ignored {
                kind: self.event_type.clone(),
            },
        }
    }
}

/// `PayPal` REST client with a cached OAuth token.
#[derive(Clone)]
pub struct PayPalClient {
    inner: Arc<PayPalClientInner>,
}

struct PayPalClientInner {
    client: Client,
    api_base: &'static str,
    client_id: String,
    client_secret: SecretString,
    webhook_id: String,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for PayPalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalClient")
            .field("api_base", &self.inner.api_base)
            .field("client_id", &self.inner.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PayPalClient {
    /// Create a new `PayPal` client.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Request` if the HTTP client cannot be built.
    pub fn new(config: &PayPalConfig) -> Result<Self, PaymentError> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

        Ok(Self {
            inner: Arc::new(PayPalClientInner {
                client,
                api_base: config.mode.api_base(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                webhook_id: config.webhook_id.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    /// Client id for the browser SDK.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        {
            let cached = self.inner.token.read().await;
            if let Some(token) = cached.as_ref()
                && token.expires_at > Utc::now()
            {
                return Ok(token.access_token.clone());
            }
        }

        let mut slot = self.inner.token.write().await;
        if let Some(token) = slot.as_ref()
            && token.expires_at > Utc::now()
        {
            return Ok(token.access_token.clone());
        }

        let response = self
            .inner
            .client
            .post(format!("{}/v1/oauth2/token", self.inner.api_base))
            .basic_auth(
                &self.inner.client_id,
                Some(self.inner.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: TokenResponse = handle_response(response).await?;
        let lifetime = (token.expires_in - TOKEN_REFRESH_MARGIN_SECS).max(0);
        debug!(expires_in = token.expires_in, "Fetched PayPal access token");

        *slot = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });
        Ok(token.access_token)
    }

    /// Create a `PayPal` order for the full order total.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if `PayPal` rejects the request.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn create_order(&self, order: &Order) -> Result<PayPalOrder, PaymentError> {
        let token = self.access_token().await?;
        let body = order_request(order);

        let response = self
            .inner
            .client
            .post(format!("{}/v2/checkout/orders", self.inner.api_base))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("order-{}", order.id))
            .json(&body)
            .send()
            .await?;

        let created: OrderResponse = handle_response(response).await?;
        let approve_url = created
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone());

        debug!(paypal_order = %created.id, "PayPal order created");
        Ok(PayPalOrder {
            id: created.id,
            status: created.status,
            approve_url,
        })
    }

    /// Capture an approved `PayPal` order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if `PayPal` rejects the capture.
    #[instrument(skip(self))]
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<PayPalCapture, PaymentError> {
        let token = self.access_token().await?;

        let response = self
            .inner
            .client
            .post(format!(
                "{}/v2/checkout/orders/{paypal_order_id}/capture",
                self.inner.api_base
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let captured: OrderResponse = handle_response(response).await?;
        Ok(PayPalCapture {
            id: captured.id,
            status: captured.status,
        })
    }

    /// Verify a webhook delivery with `PayPal` and parse its event.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidSignature` if `PayPal` does not confirm
    /// the delivery.
    #[instrument(skip(self, headers, body))]
    pub async fn verify_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &str,
    ) -> Result<PayPalEvent, PaymentError> {
        let event: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| PaymentError::Response(format!("invalid PayPal event: {e}")))?;
        let token = self.access_token().await?;

        let request = serde_json::json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": self.inner.webhook_id,
            "webhook_event": event,
        });

        let response = self
            .inner
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.inner.api_base
            ))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let verified: VerifyResponse = handle_response(response).await?;
        if verified.verification_status != "SUCCESS" {
            return Err(PaymentError::InvalidSignature(format!(
                "verification status {}",
                verified.verification_status
            )));
        }

        serde_json::from_value(event)
            .map_err(|e| PaymentError::Response(format!("invalid PayPal event: {e}")))
    }
}

fn order_request(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": order.order_number,
            "custom_id": order.id.to_string(),
            "amount": {
                "currency_code": order.currency.code(),
                "value": format!("{:.2}", order.totals.total),
            },
        }],
    })
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
        .json::<PayPalErrorBody>()
        .await
        .ok()
        .and_then(|b| b.message.or(b.error_description))
        .unwrap_or_else(|| "unknown error".to_string());

    Err(PaymentError::Api {
        status: status.as_u16(),
        message,
    })
}

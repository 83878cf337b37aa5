//! Payment routes.
//!
//! Checkout creates the order first; these endpoints then start a payment
//! with a provider for that order and record the provider's reference on it.
//! The provider's webhook is the source of truth for the outcome: it is
//! matched back to the order by that reference.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use emporium_core::{
    CurrencyCode, OrderId, OrderStatus, PaymentMethod, PaymentStatus, to_minor_units,
};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Order};
use crate::payments::paypal::WebhookHeaders;
use crate::payments::{PayPalClient, PaymentError, StripeClient, WebhookEvent};
use crate::state::AppState;

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(config))
        .route("/stripe/intent", post(stripe_intent))
        .route("/stripe/webhook", post(stripe_webhook))
        .route("/paypal/order", post(paypal_order))
        .route("/paypal/capture", post(paypal_capture))
        .route("/paypal/webhook", post(paypal_webhook))
}

#[derive(Debug, Deserialize)]
pub struct OrderRef {
    pub order_id: OrderId,
}

/// What a storefront needs to render payment options.
#[derive(Debug, Serialize)]
pub struct PaymentConfig {
    pub providers: Vec<PaymentMethod>,
    pub currency: CurrencyCode,
    pub stripe_publishable_key: Option<String>,
    pub paypal_client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct PayPalOrderResponse {
    pub paypal_order_id: String,
    pub approve_url: Option<String>,
}

fn stripe(state: &AppState) -> Result<&StripeClient> {
    state
        .stripe()
        .ok_or(AppError::Payment(PaymentError::NotConfigured("Stripe")))
}

fn paypal(state: &AppState) -> Result<&PayPalClient> {
    state
        .paypal()
        .ok_or(AppError::Payment(PaymentError::NotConfigured("PayPal")))
}

/// The caller's order, if it still awaits payment.
async fn payable_order(state: &AppState, user: &CurrentUser, id: OrderId) -> Result<Order> {
    let order = OrderRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|o| o.belongs_to(user.id))
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;

    if order.status != OrderStatus::Pending || order.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict(format!(
            "Order {} is not awaiting payment",
            order.order_number
        )));
    }
    Ok(order)
}

async fn config(State(state): State<AppState>) -> Json<PaymentConfig> {
    let mut providers = Vec::new();
    if state.stripe().is_some() {
        providers.push(PaymentMethod::Stripe);
    }
    if state.paypal().is_some() {
        providers.push(PaymentMethod::Paypal);
    }

    Json(PaymentConfig {
        providers,
        currency: state.config().currency,
        stripe_publishable_key: state
            .stripe()
            .and_then(StripeClient::publishable_key)
            .map(String::from),
        paypal_client_id: state.paypal().map(|p| p.client_id().to_string()),
    })
}

/// Create (or resume) a Stripe payment intent for an order.
#[instrument(skip(state, user, body), fields(user_id = %user.id, order_id = %body.order_id))]
async fn stripe_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<OrderRef>,
) -> Result<Json<IntentResponse>> {
    let stripe = stripe(&state)?;
    let order = payable_order(&state, &user, body.order_id).await?;
    let amount = to_minor_units(order.totals.total).ok_or(PaymentError::AmountOutOfRange)?;

    let existing = match (&order.payment_method, &order.payment_reference) {
        (PaymentMethod::Stripe, Some(reference)) => {
            Some(stripe.retrieve_payment_intent(reference).await?)
        }
        _ => None,
    };

    let intent = match existing {
        Some(intent) if intent.amount == amount && !intent.is_succeeded() => intent,
        _ => {
            let intent = stripe
                .create_payment_intent(order.id, &order.order_number, amount, order.currency)
                .await?;
            OrderRepository::new(state.pool())
                .set_payment_reference(order.id, PaymentMethod::Stripe, &intent.id)
                .await?;
            intent
        }
    };

    Ok(Json(IntentResponse {
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id, order_id = %body.order_id))]
async fn paypal_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<OrderRef>,
) -> Result<Json<PayPalOrderResponse>> {
    let paypal = paypal(&state)?;
    let order = payable_order(&state, &user, body.order_id).await?;

    let created = paypal.create_order(&order).await?;
    OrderRepository::new(state.pool())
        .set_payment_reference(order.id, PaymentMethod::Paypal, &created.id)
        .await?;

    Ok(Json(PayPalOrderResponse {
        paypal_order_id: created.id,
        approve_url: created.approve_url,
    }))
}

/// Capture an approved `PayPal` order and settle the local order.
#[instrument(skip(state, user, body), fields(user_id = %user.id, order_id = %body.order_id))]
async fn paypal_capture(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<OrderRef>,
) -> Result<Json<Order>> {
    let paypal = paypal(&state)?;
    let order = payable_order(&state, &user, body.order_id).await?;
    let reference = match (&order.payment_method, &order.payment_reference) {
        (PaymentMethod::Paypal, Some(reference)) => reference.clone(),
        _ => {
            return Err(AppError::Conflict(
                "Order has no PayPal payment to capture".to_string(),
            ));
        }
    };

    let capture = paypal.capture_order(&reference).await?;
    let outcome = if capture.is_completed() {
        PaymentStatus::Paid
    } else {
        tracing::warn!(capture_status = %capture.status, "PayPal capture not completed");
        PaymentStatus::Failed
    };

    let settled = settle(&state, &reference, outcome)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order.id)))?;
    Ok(Json(settled))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let stripe = stripe(&state)?;
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature".to_string()))?;
    let payload = std::str::from_utf8(&body)
        .map_err(|_| PaymentError::InvalidSignature("payload is not UTF-8".to_string()))?;

    let event = stripe.verify_webhook(payload, signature)?;
    tracing::info!(event_id = %event.id, kind = %event.kind, "Stripe webhook received");
    reconcile(&state, event.normalize()).await?;
    Ok(Json(json!({ "received": true })))
}

async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let paypal = paypal(&state)?;
    let transmission = WebhookHeaders::from_headers(&headers)?;
    let payload = std::str::from_utf8(&body)
        .map_err(|_| PaymentError::InvalidSignature("payload is not UTF-8".to_string()))?;

    let event = paypal.verify_webhook(&transmission, payload).await?;
    tracing::info!(event_id = %event.id, kind = %event.event_type, "PayPal webhook received");
    reconcile(&state, event.normalize()).await?;
    Ok(Json(json!({ "received": true })))
}

/// Apply a verified provider event. Unknown references are acknowledged so
/// the provider stops retrying.
async fn reconcile(state: &AppState, event: WebhookEvent) -> Result<()> {
    let (reference, outcome) = match event {
        WebhookEvent::PaymentSucceeded { reference } => (reference, PaymentStatus::Paid),
        WebhookEvent::PaymentFailed { reference } => (reference, PaymentStatus::Failed),
        WebhookEvent::Ignored { kind } => {
            tracing::debug!(%kind, "Ignoring webhook event");
            return Ok(());
        }
    };

    if settle(state, &reference, outcome).await?.is_none() {
        tracing::warn!(%reference, "Webhook for unknown payment reference");
    }
    Ok(())
}

/// Record a payment outcome and notify the customer when it moved the order
/// to paid.
async fn settle(
    state: &AppState,
    reference: &str,
    outcome: PaymentStatus,
) -> Result<Option<Order>> {
    let Some(order) = OrderRepository::new(state.pool())
        .mark_payment(reference, outcome)
        .await?
    else {
        return Ok(None);
    };

    tracing::info!(
        order_id = %order.id,
        payment_status = ?order.payment_status,
        "Payment reconciled"
    );

    if outcome == PaymentStatus::Paid && order.status == OrderStatus::Paid {
        state.dashboard_cache().invalidate_all();
        if let Err(e) = state.mailer().send_status_update(&order).await {
            tracing::warn!(order_id = %order.id, error = %e, "Failed to send payment email");
        }
    }
    Ok(Some(order))
}

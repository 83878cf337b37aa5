//! Transactional email.
//!
//! Uses SMTP via lettre for delivery with Askama templates (HTML and plain
//! text). Without SMTP configuration messages are rendered and written to
//! the log instead, which keeps local development self-contained.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{debug, info};

use emporium_core::{CurrencyCode, OrderStatus};

use crate::config::EmailConfig;
use crate::models::order::Order;
use crate::models::user::User;

#[derive(Template)]
#[template(path = "email/verification.html")]
struct VerificationHtml<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/verification.txt")]
struct VerificationText<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    name: &'a str,
    link: &'a str,
}

/// One order line, pre-formatted for templates.
struct LineSummary {
    name: String,
    quantity: u32,
    line_total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_number: &'a str,
    lines: &'a [LineSummary],
    subtotal: &'a str,
    shipping: &'a str,
    discount: Option<&'a str>,
    tax: &'a str,
    total: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_number: &'a str,
    lines: &'a [LineSummary],
    subtotal: &'a str,
    shipping: &'a str,
    discount: Option<&'a str>,
    tax: &'a str,
    total: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.html")]
struct OrderStatusHtml<'a> {
    order_number: &'a str,
    status: &'a str,
    tracking_number: Option<&'a str>,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.txt")]
struct OrderStatusText<'a> {
    order_number: &'a str,
    status: &'a str,
    tracking_number: Option<&'a str>,
    link: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Log,
}

/// Sends transactional emails.
#[derive(Clone)]
pub struct Mailer {
    transport: Transport,
    from_address: String,
    base_url: String,
    currency: CurrencyCode,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("smtp", &matches!(self.transport, Transport::Smtp(_)))
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl Mailer {
    /// SMTP mailer when configured, log-only otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be set up.
    pub fn new(
        config: Option<&EmailConfig>,
        base_url: &str,
        currency: CurrencyCode,
    ) -> Result<Self, MailError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let Some(config) = config else {
            return Ok(Self::log_only(&base_url, currency));
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport: Transport::Smtp(mailer),
            from_address: config.from_address.clone(),
            base_url,
            currency,
        })
    }

    /// A mailer that only logs.
    #[must_use]
    pub fn log_only(base_url: &str, currency: CurrencyCode) -> Self {
        Self {
            transport: Transport::Log,
            from_address: "no-reply@localhost".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            currency,
        }
    }

    /// Whether messages actually leave the process.
    #[must_use]
    pub const fn is_smtp(&self) -> bool {
        matches!(self.transport, Transport::Smtp(_))
    }

    /// Send the email verification link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification(&self, user: &User, token: &str) -> Result<(), MailError> {
        let link = format!("{}/verify-email?token={token}", self.base_url);
        let name = user.name.as_str();
        let html = VerificationHtml { name, link: &link }.render()?;
        let text = VerificationText { name, link: &link }.render()?;

        self.send_multipart_email(user.email.as_str(), "Confirm your email address", &text, &html)
            .await
    }

    /// Send the password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset(&self, user: &User, token: &str) -> Result<(), MailError> {
        let link = format!("{}/reset-password?token={token}", self.base_url);
        let name = user.name.as_str();
        let html = PasswordResetHtml { name, link: &link }.render()?;
        let text = PasswordResetText { name, link: &link }.render()?;

        self.send_multipart_email(user.email.as_str(), "Reset your password", &text, &html)
            .await
    }

    /// Send the order confirmation with the priced line snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &Order) -> Result<(), MailError> {
        let (text, html) = self.render_order_confirmation(order)?;
        let subject = format!("Order {} confirmed", order.order_number);

        self.send_multipart_email(&order.email, &subject, &text, &html)
            .await
    }

    /// Tell the customer their order moved to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_status_update(&self, order: &Order) -> Result<(), MailError> {
        let link = self.order_link(order);
        let status = status_label(order.status);
        let tracking_number = order.tracking_number.as_deref();
        let order_number = order.order_number.as_str();

        let html = OrderStatusHtml {
            order_number,
            status,
            tracking_number,
            link: &link,
        }
        .render()?;
        let text = OrderStatusText {
            order_number,
            status,
            tracking_number,
            link: &link,
        }
        .render()?;

        let subject = format!("Order {order_number}: {status}");
        self.send_multipart_email(&order.email, &subject, &text, &html)
            .await
    }

    fn order_link(&self, order: &Order) -> String {
        format!("{}/orders/{}", self.base_url, order.id)
    }

    fn render_order_confirmation(&self, order: &Order) -> Result<(String, String), MailError> {
        let fmt = |amount| self.currency.format(amount);
        let lines: Vec<LineSummary> = order
            .items
            .iter()
            .map(|l| LineSummary {
                name: l.name.clone(),
                quantity: l.quantity,
                line_total: fmt(l.line_total),
            })
            .collect();

        let subtotal = fmt(order.totals.subtotal);
        let shipping = fmt(order.totals.shipping);
        let discount = (!order.totals.discount.is_zero()).then(|| fmt(order.totals.discount));
        let tax = fmt(order.totals.tax);
        let total = fmt(order.totals.total);
        let link = self.order_link(order);

        let html = OrderConfirmationHtml {
            order_number: &order.order_number,
            lines: &lines,
            subtotal: &subtotal,
            shipping: &shipping,
            discount: discount.as_deref(),
            tax: &tax,
            total: &total,
            link: &link,
        }
        .render()?;
        let text = OrderConfirmationText {
            order_number: &order.order_number,
            lines: &lines,
            subtotal: &subtotal,
            shipping: &shipping,
            discount: discount.as_deref(),
            tax: &tax,
            total: &total,
            link: &link,
        }
        .render()?;

        Ok((text, html))
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        let mailer = match &self.transport {
            Transport::Smtp(mailer) => mailer,
            Transport::Log => {
                info!(to = %to, subject = %subject, "SMTP not configured, email not sent");
                debug!(body = %text_body, "Email body");
                return Ok(());
            }
        };

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.send(email).await?;

        info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

const fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Awaiting payment",
        OrderStatus::Paid => "Payment received",
        OrderStatus::Processing => "Being prepared",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Returned => "Returned",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use emporium_core::{
        Email, LineAmount, OrderId, OrderTotals, PaymentMethod, PaymentStatus, PricingRules,
        ProductId, UserId, UserRole,
    };

    use super::*;
    use crate::models::order::OrderLine;
    use crate::models::user::Address;

    fn user() -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("ada@example.com").unwrap(),
            name: "Ada".into(),
            phone: None,
            role: UserRole::User,
            email_verified: false,
            addresses: vec![],
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order() -> Order {
        let price = Decimal::new(1250, 2);
        let totals = OrderTotals::compute(
            &[LineAmount::new(price, 2)],
            &PricingRules::default(),
            Decimal::ZERO,
        );
        Order {
            id: OrderId::new(9),
            order_number: "ORD-20260101-ABC123".into(),
            user_id: Some(UserId::new(1)),
            email: "ada@example.com".into(),
            items: vec![OrderLine {
                product_id: ProductId::new(3),
                name: "Teapot <Large>".into(),
                sku: None,
                unit_price: price,
                quantity: 2,
                line_total: Decimal::new(2500, 2),
                image_url: None,
            }],
            totals,
            currency: CurrencyCode::default(),
            shipping_address: Address::default(),
            billing_address: None,
            payment_method: PaymentMethod::Stripe,
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            status: OrderStatus::Shipped,
            tracking_number: Some("1Z999".into()),
            notes: None,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            retention_until: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_confirmation_renders_lines_and_totals() {
        let mailer = Mailer::log_only("https://shop.example.com/", CurrencyCode::default());
        let (text, html) = mailer.render_order_confirmation(&order()).unwrap();

        assert!(text.contains("ORD-20260101-ABC123"));
        assert!(text.contains("Teapot <Large> x 2"));
        assert!(text.contains("https://shop.example.com/orders/9"));
        assert!(html.contains("Teapot &#60;Large&#62;") || html.contains("Teapot &lt;Large&gt;"));
        assert!(!text.contains("Discount"));
    }

    #[test]
    fn test_status_labels_cover_every_status() {
        for status in OrderStatus::ALL {
            assert!(!status_label(status).is_empty());
        }
    }

    #[tokio::test]
    async fn test_log_only_mailer_succeeds() {
        let mailer = Mailer::log_only("http://localhost:4000", CurrencyCode::default());
        assert!(!mailer.is_smtp());
        mailer.send_verification(&user(), "token").await.unwrap();
        mailer.send_password_reset(&user(), "token").await.unwrap();
        mailer.send_status_update(&order()).await.unwrap();
    }
}

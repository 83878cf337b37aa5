//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; clients always get
//! `{ "error": <message> }` and never see internal details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::services::{AuthError, CartError, CheckoutError, MailError, UploadError};

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Email error: {0}")]
    Mail(#[from] MailError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Well-formed input that breaks a business rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) | RepositoryError::InsufficientStock(_) => {
            StatusCode::CONFLICT
        }
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_message(err: &RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Not found".to_string(),
        RepositoryError::Conflict(what) => what.clone(),
        RepositoryError::InsufficientStock(id) => format!("Insufficient stock for product {id}"),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Internal server error".to_string()
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) | AuthError::InvalidToken => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidName(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash | AuthError::Jwt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartError::InvalidQuantity => StatusCode::UNPROCESSABLE_ENTITY,
                CartError::ProductUnavailable(_) | CartError::ItemNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CartError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CartError::Repository(err) => repository_status(err),
            },
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart
                | CheckoutError::MissingAddress
                | CheckoutError::InvalidAddress(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::ProductUnavailable(_)
                | CheckoutError::InsufficientStock { .. }
                | CheckoutError::NotCancellable(_)
                | CheckoutError::InvalidTransition(_) => StatusCode::CONFLICT,
                CheckoutError::OrderNotFound => StatusCode::NOT_FOUND,
                CheckoutError::Repository(err) => repository_status(err),
            },
            Self::Payment(err) => match err {
                PaymentError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                PaymentError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
                PaymentError::AmountOutOfRange => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::Request(_) | PaymentError::Api { .. } | PaymentError::Response(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Upload(err) => match err {
                UploadError::Empty | UploadError::ContentMismatch | UploadError::InvalidName => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                UploadError::NotFound => StatusCode::NOT_FOUND,
                UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Mail(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client-facing message.
    fn public_message(&self) -> String {
        match self {
            Self::Database(err)
            | Self::Auth(AuthError::Repository(err))
            | Self::Cart(CartError::Repository(err))
            | Self::Checkout(CheckoutError::Repository(err)) => repository_message(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::WeakPassword(msg) | AuthError::InvalidName(msg) => msg.clone(),
                AuthError::PasswordHash | AuthError::Jwt(_) => "Authentication error".to_string(),
                other => capitalize(&other.to_string()),
            },
            Self::Cart(err) => capitalize(&err.to_string()),
            Self::Checkout(err) => capitalize(&err.to_string()),
            Self::Payment(err) => match err {
                PaymentError::NotConfigured(_) | PaymentError::AmountOutOfRange => {
                    capitalize(&err.to_string())
                }
                PaymentError::InvalidSignature(_) => "Invalid webhook signature".to_string(),
                _ => "Payment provider error".to_string(),
            },
            Self::Upload(err) => match err {
                UploadError::Io(_) => "Internal server error".to_string(),
                other => capitalize(&other.to_string()),
            },
            Self::Mail(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg)
            | Self::ServiceUnavailable(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

//! Business logic that spans repositories.
//!
//! Services are cheap, per-request values borrowing the pool; construct one
//! inside a handler and drop it at the end of the request.

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod email;
pub mod uploads;

pub use auth::{AuthError, AuthService, JwtKeys};
pub use cart::{CartError, CartService};
pub use checkout::{CheckoutError, CheckoutRequest, CheckoutService, CheckoutSettings};
pub use email::{MailError, Mailer};
pub use uploads::{UploadError, UploadStore};

//! Admin account management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a verified admin account
//! ADMIN_PASSWORD=... emporium admin create -e admin@example.com -n "Admin Name"
//!
//! # Promote an existing customer
//! emporium admin promote -e someone@example.com
//! ```

use emporium_api::db::UserRepository;
use emporium_api::services::{AuthService, Mailer};
use emporium_core::{CurrencyCode, Email, UserId, UserRole};

use super::{CommandError, connect};

/// Create a verified admin account.
///
/// # Errors
///
/// Returns `AuthError` for an invalid email, name or password, or if the
/// email is already registered.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, CommandError> {
    let pool = connect().await?;

    // Nothing is emailed when creating a verified account.
    let mailer = Mailer::log_only("http://localhost", CurrencyCode::default());
    let auth = AuthService::new(&pool, &mailer);

    tracing::info!("Creating admin user: {}", email);
    let user = auth
        .create_verified(email, password, name, UserRole::Admin)
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(user.id)
}

/// Change the role of an existing account.
///
/// # Errors
///
/// Returns `CommandError::Invalid` if no account has that email.
pub async fn set_role(email: &str, role: UserRole) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::Invalid(e.to_string()))?;
    let pool = connect().await?;
    let users = UserRepository::new(&pool);

    let user = users
        .get_by_email(&email)
        .await?
        .ok_or_else(|| CommandError::Invalid(format!("No account with email {email}")))?;

    if user.role == role {
        tracing::info!("{} already has role {}", email, role);
        return Ok(());
    }

    let user = users.set_role(user.id, role).await?;
    tracing::info!("{} is now {}", user.email, user.role);
    Ok(())
}

//! Authentication service.
//!
//! Password accounts with email verification and password reset. One-time
//! tokens are random 256-bit values sent to the user by email; only their
//! SHA-256 digest is stored.

mod error;
pub mod jwt;

pub use error::AuthError;
pub use jwt::{Claims, JwtKeys};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{info, warn};

use emporium_core::{Email, UserId, UserRole};

use crate::db::RepositoryError;
use crate::db::users::{TokenHash, UserRepository};
use crate::models::user::User;
use crate::services::email::Mailer;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 100;

/// How long an email verification link stays valid.
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(24);

/// How long a password reset link stays valid.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// Authentication service.
///
/// Handles registration, login, email verification and password changes.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    mailer: &'a Mailer,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, mailer: &'a Mailer) -> Self {
        Self {
            users: UserRepository::new(pool),
            mailer,
        }
    }

    /// Register a new customer account and email a verification link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let name = validate_name(name)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let token = generate_token();
        let token_hash = hash_token(&token);

        let user = self
            .users
            .create(
                &email,
                &password_hash,
                name,
                UserRole::User,
                Some(TokenHash {
                    hash: &token_hash,
                    expires_at: Utc::now() + VERIFICATION_TOKEN_TTL,
                }),
            )
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "Account registered");

        if let Err(e) = self.mailer.send_verification(&user, &token).await {
            warn!(user_id = %user.id, error = %e, "Failed to send verification email");
        }

        Ok(user)
    }

    /// Create an account directly, without email verification. Used by the
    /// CLI to bootstrap administrators.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn create_verified(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let name = validate_name(name)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(&email, &password_hash, name, role, None)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        self.users
            .mark_verified(user.id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        self.users.touch_last_login(user.id).await?;
        Ok(user)
    }

    /// Consume an email verification token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is unknown, used or expired.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .verify_email_by_token(&hash_token(token.trim()), Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    /// Issue a fresh verification link. Silently does nothing for unknown or
    /// already verified addresses.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(());
        };
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(());
        };
        if user.email_verified {
            return Ok(());
        }

        let token = generate_token();
        self.users
            .set_verification_token(
                user.id,
                TokenHash {
                    hash: &hash_token(&token),
                    expires_at: Utc::now() + VERIFICATION_TOKEN_TTL,
                },
            )
            .await?;

        if let Err(e) = self.mailer.send_verification(&user, &token).await {
            warn!(user_id = %user.id, error = %e, "Failed to send verification email");
        }
        Ok(())
    }

    /// Email a password reset link. The result is the same whether or not
    /// the address has an account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(());
        };
        let Some(user) = self.users.get_by_email(&email).await? else {
            info!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = generate_token();
        self.users
            .set_reset_token(
                user.id,
                TokenHash {
                    hash: &hash_token(&token),
                    expires_at: Utc::now() + RESET_TOKEN_TTL,
                },
            )
            .await?;

        if let Err(e) = self.mailer.send_password_reset(&user, &token).await {
            warn!(user_id = %user.id, error = %e, "Failed to send password reset email");
        }
        Ok(())
    }

    /// Set a new password using a reset token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the new password is rejected.
    /// Returns `AuthError::InvalidToken` if the token is unknown, used or expired.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;

        let user_id = self
            .users
            .reset_password_by_token(&hash_token(token.trim()), &password_hash, Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        info!(user_id = %user_id, "Password reset");
        Ok(())
    }

    /// Change the password of a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the current password is wrong.
    /// Returns `AuthError::WeakPassword` if the new password is rejected.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let current_hash = self
            .users
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password(current_password, &current_hash)?;
        validate_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.users.update_password(user_id, &password_hash).await?;

        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Validate password meets requirements: 8 to 128 characters with at least
/// one letter and one digit.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` describing the first unmet rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AuthError::WeakPassword(
            "password must contain a letter and a digit".to_string(),
        ));
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name)
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on mismatch or a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// A fresh one-time token: 32 random bytes, hex encoded.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a token, hex encoded. This is what gets stored.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        assert!(validate_password("abc123").is_err());
        assert!(validate_password("abcdefgh").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("hunter22").is_ok());
        assert!(validate_password(&format!("a1{}", "x".repeat(127))).is_err());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse 1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse 1", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse 1", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_malformed_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything1", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_hash_is_stable_and_differs_from_token() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(validate_name("  Ada ").unwrap(), "Ada");
        assert!(validate_name("   ").is_err());
    }
}

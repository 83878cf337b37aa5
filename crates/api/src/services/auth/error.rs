//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] emporium_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Display name empty or too long.
    #[error("{0}")]
    InvalidName(String),

    /// Verification or reset token unknown, used or expired.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Bearer token past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Token signing failed.
    #[error("token signing error: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),
}

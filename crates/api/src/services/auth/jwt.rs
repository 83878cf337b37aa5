//! Bearer token issuance and verification (HS256).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use emporium_core::{UserId, UserRole};

use super::AuthError;
use crate::models::user::CurrentUser;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Jwt` if signing fails.
    pub fn issue(&self, user: UserId, email: &str, role: UserRole) -> Result<String, AuthError> {
        self.issue_at(user, email, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Jwt` if signing fails.
    pub fn issue_at(
        &self,
        user: UserId,
        email: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.to_string(),
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Jwt)
    }

    /// Verify a token and return the user it names.
    ///
    /// Expiry is checked with zero leeway.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` for an expired token and
    /// `AuthError::InvalidToken` for anything else that fails validation.
    pub fn verify(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            },
        )?;

        let id: UserId = data.claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
        Ok(CurrentUser {
            id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(
            &SecretString::from("k8Qz!vR2#mW9pL4xN7sT1yB6cF3hJ5dG0aE".to_string()),
            Duration::hours(1),
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys();
        let token = keys
            .issue(UserId::new(42), "ada@example.com", UserRole::Admin)
            .unwrap();

        let user = keys.verify(&token).unwrap();
        assert_eq!(user.id, UserId::new(42));
        assert_eq!(user.email, "ada@example.com");
        assert!(user.is_admin());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = keys();
        let issued = Utc::now() - Duration::hours(2);
        let token = keys
            .issue_at(UserId::new(1), "ada@example.com", UserRole::User, issued)
            .unwrap();

        assert!(matches!(keys.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = keys()
            .issue(UserId::new(1), "ada@example.com", UserRole::User)
            .unwrap();
        let other = JwtKeys::new(
            &SecretString::from("another-Secret-value-0123456789-xyz!".to_string()),
            Duration::hours(1),
        );

        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            keys().verify("not.a.token"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_role_round_trips() {
        let keys = keys();
        let token = keys
            .issue(UserId::new(7), "bob@example.com", UserRole::User)
            .unwrap();
        assert!(!keys.verify(&token).unwrap().is_admin());
    }
}

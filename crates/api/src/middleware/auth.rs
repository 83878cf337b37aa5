//! Authentication extractors.
//!
//! Access tokens travel as `Authorization: Bearer <jwt>`. Anonymous carts
//! are keyed by a client-generated `X-Session-Id`.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn me(RequireAuth(user): RequireAuth) -> impl IntoResponse {
//!     format!("Hello, {}!", user.email)
//! }
//! ```

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use emporium_core::{UserId, UserRole};

use crate::db::UserRepository;
use crate::error::set_sentry_user;
use crate::models::{CartOwnerKey, CurrentUser};
use crate::services::AuthError;
use crate::state::AppState;

/// Header carrying the anonymous cart id.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Why a request was turned away by an auth extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No bearer token.
    MissingToken,
    /// Token malformed or signed with another key.
    InvalidToken,
    /// Token past its expiry.
    TokenExpired,
    /// Token for an account that has since been deleted.
    AccountGone,
    /// The account could not be looked up.
    Unavailable,
    /// Authenticated, but not an admin.
    Forbidden,
    /// Neither a token nor a usable `X-Session-Id`.
    MissingSession,
    /// `X-Session-Id` present but malformed.
    InvalidSession,
}

impl AuthRejection {
    const fn status(self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken | Self::TokenExpired | Self::AccountGone => {
                StatusCode::UNAUTHORIZED
            }
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::MissingSession | Self::InvalidSession => StatusCode::BAD_REQUEST,
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::MissingToken => "Authentication required",
            Self::InvalidToken => "Invalid access token",
            Self::TokenExpired => "Access token expired",
            Self::AccountGone => "Account no longer exists",
            Self::Unavailable => "Authentication is temporarily unavailable",
            Self::Forbidden => "Admin access required",
            Self::MissingSession => "Sign in or send an X-Session-Id header",
            Self::InvalidSession => "Invalid X-Session-Id header",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(json!({ "error": self.message() }))).into_response();
        if self.status() == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// `Ok(None)` when the header is absent; a present but unusable header is
/// an error rather than an anonymous request.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthRejection> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| AuthRejection::InvalidToken)?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthRejection::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthRejection::InvalidToken);
    }

    Ok(Some(token.trim()))
}

/// Role currently on record for `id`, or `None` if the account is gone.
async fn current_role(state: &AppState, id: UserId) -> Result<Option<UserRole>, AuthRejection> {
    state
        .account_cache()
        .try_get_with(id, async {
            UserRepository::new(state.pool())
                .get_by_id(id)
                .await
                .map(|user| user.map(|u| u.role))
        })
        .await
        .map_err(|e| {
            tracing::error!(user_id = %id, error = %e, "Failed to load account for token");
            AuthRejection::Unavailable
        })
}

/// Verify the bearer token, if any, and resolve its subject's current role.
async fn authenticate(
    parts: &Parts,
    state: &AppState,
) -> Result<Option<CurrentUser>, AuthRejection> {
    let Some(token) = bearer_token(parts)? else {
        return Ok(None);
    };

    let mut user = state.jwt().verify(token).map_err(|e| match e {
        AuthError::TokenExpired => AuthRejection::TokenExpired,
        _ => AuthRejection::InvalidToken,
    })?;

    let role = current_role(state, user.id)
        .await?
        .ok_or(AuthRejection::AccountGone)?;
    if role != user.role {
        tracing::info!(user_id = %user.id, claimed = %user.role, %role, "Token role is stale");
        user.role = role;
    }

    set_sentry_user(&user.id, Some(&user.email));
    Ok(Some(user))
}

/// Extractor that requires a valid access token.
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        authenticate(parts, &state)
            .await?
            .map(Self)
            .ok_or(AuthRejection::MissingToken)
    }
}

/// Extractor that requires a valid access token with the admin role.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin hit admin route");
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// A missing header yields `None`; a bad or expired token is still rejected
/// so clients learn they need to sign in again.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(Self(authenticate(parts, &state).await?))
    }
}

/// Check a client-generated session id: 8..=128 of `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    (8..=128).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Read and validate `X-Session-Id`, if present.
///
/// # Errors
///
/// Returns `AuthRejection::InvalidSession` for a malformed value.
pub fn session_id(headers: &HeaderMap) -> Result<Option<String>, AuthRejection> {
    let Some(value) = headers.get(SESSION_ID_HEADER) else {
        return Ok(None);
    };
    let id = value
        .to_str()
        .map_err(|_| AuthRejection::InvalidSession)?
        .trim();
    if !is_valid_session_id(id) {
        return Err(AuthRejection::InvalidSession);
    }
    Ok(Some(id.to_string()))
}

/// Whose cart a request addresses: the signed-in user, otherwise the
/// anonymous session.
pub struct CartOwner(pub CartOwnerKey);

impl<S> FromRequestParts<S> for CartOwner
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        if let Some(user) = authenticate(parts, &state).await? {
            return Ok(Self(CartOwnerKey::User(user.id)));
        }

        session_id(&parts.headers)?
            .map(|id| Self(CartOwnerKey::Session(id)))
            .ok_or(AuthRejection::MissingSession)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    use crate::state::test_support::{TEST_USER_ID, bearer, test_state};

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(&[])), Ok(None));
        assert_eq!(
            bearer_token(&parts(&[("authorization", "Bearer abc.def.ghi")])),
            Ok(Some("abc.def.ghi"))
        );
        assert_eq!(
            bearer_token(&parts(&[("authorization", "bearer abc")])),
            Ok(Some("abc"))
        );
        assert_eq!(
            bearer_token(&parts(&[("authorization", "Basic dXNlcjpwYXNz")])),
            Err(AuthRejection::InvalidToken)
        );
        assert_eq!(
            bearer_token(&parts(&[("authorization", "Bearer ")])),
            Err(AuthRejection::InvalidToken)
        );
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("abcd1234"));
        assert!(is_valid_session_id("9f1c2b7e-4a0d-4e55-b5a3-0c2f6d8e1a77"));
        assert!(is_valid_session_id(&"a".repeat(128)));
        assert!(!is_valid_session_id("short"));
        assert!(!is_valid_session_id(&"a".repeat(129)));
        assert!(!is_valid_session_id("has space1"));
        assert!(!is_valid_session_id("../../etc"));
    }

    #[test]
    fn test_session_id_header() {
        assert_eq!(session_id(&parts(&[]).headers), Ok(None));
        assert_eq!(
            session_id(&parts(&[("x-session-id", "guest_session_01")]).headers),
            Ok(Some("guest_session_01".to_string()))
        );
        assert_eq!(
            session_id(&parts(&[("x-session-id", "bad!")]).headers),
            Err(AuthRejection::InvalidSession)
        );
    }

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(
            AuthRejection::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::TokenExpired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthRejection::MissingSession.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthRejection::AccountGone.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_demoted_admin_loses_admin_access() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        state
            .account_cache()
            .insert(TEST_USER_ID, Some(UserRole::User))
            .await;

        let mut request = parts(&[("authorization", token.as_str())]);
        let rejection = RequireAdmin::from_request_parts(&mut request, &state)
            .await
            .err();
        assert_eq!(rejection, Some(AuthRejection::Forbidden));

        let RequireAuth(user) = RequireAuth::from_request_parts(&mut request, &state)
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_deleted_account_token_rejected() {
        let state = test_state();
        let token = bearer(&state, UserRole::Admin).await;
        state.account_cache().insert(TEST_USER_ID, None).await;

        let mut request = parts(&[("authorization", token.as_str())]);
        let rejection = RequireAuth::from_request_parts(&mut request, &state)
            .await
            .err();
        assert_eq!(rejection, Some(AuthRejection::AccountGone));
        assert_eq!(
            CartOwner::from_request_parts(&mut request, &state)
                .await
                .err(),
            Some(AuthRejection::AccountGone)
        );
    }

    #[tokio::test]
    async fn test_promoted_user_gains_admin_access() {
        let state = test_state();
        let token = bearer(&state, UserRole::User).await;
        state
            .account_cache()
            .insert(TEST_USER_ID, Some(UserRole::Admin))
            .await;

        let mut request = parts(&[("authorization", token.as_str())]);
        let RequireAdmin(admin) = RequireAdmin::from_request_parts(&mut request, &state)
            .await
            .unwrap();
        assert!(admin.is_admin());
    }
}

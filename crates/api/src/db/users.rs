//! User repository for database operations.
//!
//! One-time tokens (email verification, password reset) are stored only as
//! SHA-256 hashes. Callers hash the token before passing it in.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use emporium_core::{Email, PageParams, UserId, UserRole};

use super::RepositoryError;
use crate::models::user::{Address, ProfileUpdate, User};

const USER_COLUMNS: &str = "id, email, name, phone, role, email_verified, addresses, \
                            last_login_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    name: String,
    phone: Option<String>,
    role: UserRole,
    email_verified: bool,
    addresses: Json<Vec<Address>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: r.id,
            email,
            name: r.name,
            phone: r.phone,
            role: r.role,
            email_verified: r.email_verified,
            addresses: r.addresses.0,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// A token to store alongside a new account.
#[derive(Debug, Clone)]
pub struct TokenHash<'a> {
    pub hash: &'a str,
    pub expires_at: DateTime<Utc>,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a user with a password and a pending verification token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, password_hash, verification), fields(email = %email))]
    pub async fn create(
        &self,
        email: &Email,
        password_hash: &str,
        name: &str,
        role: UserRole,
        verification: Option<TokenHash<'_>>,
    ) -> Result<User, RepositoryError> {
        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO users
                (email, password_hash, name, role, verification_token_hash, verification_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .bind(verification.as_ref().map(|t| t.hash))
        .bind(verification.as_ref().map(|t| t.expires_at))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "email"))?;

        row.try_into()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user together with their password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<CredentialsRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .transpose()
    }

    /// Get the password hash of a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(|r| r.0))
    }

    /// Update name and phone. Absent fields are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE users
            SET name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.phone.as_deref().map(str::trim))
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Replace a user's password hash and drop any pending reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET password_hash = $2,
                reset_token_hash = NULL,
                reset_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Delete a user. Their cart goes with them; their orders are kept
    /// with `user_id` cleared.
    ///
    /// # Returns
    ///
    /// Returns `true` if the user was deleted, `false` if they didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List users, newest first, optionally filtered by a search term that
    /// matches email or name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        search: Option<&str>,
        page: PageParams,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            r"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1::text IS NULL OR email ILIKE $1 OR name ILIKE $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(pattern.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM users
            WHERE $1::text IS NULL OR email ILIKE $1 OR name ILIKE $1
            ",
        )
        .bind(pattern.as_deref())
        .fetch_one(self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total.0))
    }

    /// Store a fresh verification token hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_verification_token(
        &self,
        id: UserId,
        token: TokenHash<'_>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET verification_token_hash = $2, verification_expires_at = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(token.hash)
        .bind(token.expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark the account holding an unexpired verification token as verified
    /// and consume the token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn verify_email_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE users
            SET email_verified = TRUE,
                verification_token_hash = NULL,
                verification_expires_at = NULL,
                updated_at = now()
            WHERE verification_token_hash = $1 AND verification_expires_at > $2
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Mark an address verified without a token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_verified(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r"
            UPDATE users
            SET email_verified = TRUE,
                verification_token_hash = NULL,
                verification_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Store a fresh password reset token hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_reset_token(
        &self,
        id: UserId,
        token: TokenHash<'_>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET reset_token_hash = $2, reset_expires_at = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(token.hash)
        .bind(token.expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Set a new password for the account holding an unexpired reset token
    /// and consume the token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset_password_by_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError> {
        let row: Option<(UserId,)> = sqlx::query_as(
            r"
            UPDATE users
            SET password_hash = $2,
                reset_token_hash = NULL,
                reset_expires_at = NULL,
                updated_at = now()
            WHERE reset_token_hash = $1 AND reset_expires_at > $3
            RETURNING id
            ",
        )
        .bind(token_hash)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_last_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Replace the address book.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_addresses(
        &self,
        id: UserId,
        addresses: &[Address],
    ) -> Result<Vec<Address>, RepositoryError> {
        let row: Option<(Json<Vec<Address>>,)> = sqlx::query_as(
            r"
            UPDATE users SET addresses = $2, updated_at = now()
            WHERE id = $1
            RETURNING addresses
            ",
        )
        .bind(id)
        .bind(Json(addresses))
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.0.0).ok_or(RepositoryError::NotFound)
    }

    /// Number of accounts with the given role, or all accounts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, role: Option<UserRole>) -> Result<i64, RepositoryError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE $1::user_role IS NULL OR role = $1")
                .bind(role)
                .fetch_one(self.pool)
                .await?;
        Ok(row.0)
    }
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("ada"), "ada");
    }
}

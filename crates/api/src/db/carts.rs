//! Cart repository.
//!
//! A cart belongs to exactly one owner: a user or an anonymous session.
//! Lines are stored as a JSONB array and never carry prices.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use emporium_core::{CartId, UserId};

use super::RepositoryError;
use crate::models::cart::{Cart, CartLine, CartOwnerKey};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: Option<UserId>,
    session_id: Option<String>,
    items: Json<Vec<CartLine>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(r: CartRow) -> Result<Self, Self::Error> {
        let owner = match (r.user_id, r.session_id) {
            (Some(user), None) => CartOwnerKey::User(user),
            (None, Some(session)) => CartOwnerKey::Session(session),
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "cart {} does not have exactly one owner",
                    r.id
                )));
            }
        };

        Ok(Self {
            id: r.id,
            owner,
            items: r.items.0,
            updated_at: r.updated_at,
        })
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the cart of an owner, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_owner(
        &self,
        owner: &CartOwnerKey,
    ) -> Result<Option<Cart>, RepositoryError> {
        let query = match owner {
            CartOwnerKey::User(id) => sqlx::query_as::<_, CartRow>(
                "SELECT id, user_id, session_id, items, updated_at FROM carts WHERE user_id = $1",
            )
            .bind(*id),
            CartOwnerKey::Session(session) => sqlx::query_as::<_, CartRow>(
                "SELECT id, user_id, session_id, items, updated_at FROM carts WHERE session_id = $1",
            )
            .bind(session.clone()),
        };

        query
            .fetch_optional(self.pool)
            .await?
            .map(Cart::try_from)
            .transpose()
    }

    /// Find the cart of an owner, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, owner: &CartOwnerKey) -> Result<Cart, RepositoryError> {
        let (user_id, session_id, conflict) = match owner {
            CartOwnerKey::User(id) => (Some(*id), None, "user_id"),
            CartOwnerKey::Session(s) => (None, Some(s.as_str()), "session_id"),
        };

        // The no-op update makes RETURNING yield the existing row on conflict.
        let row: CartRow = sqlx::query_as(&format!(
            r"
            INSERT INTO carts (user_id, session_id)
            VALUES ($1, $2)
            ON CONFLICT ({conflict}) DO UPDATE SET updated_at = carts.updated_at
            RETURNING id, user_id, session_id, items, updated_at
            "
        ))
        .bind(user_id)
        .bind(session_id)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Replace the lines of a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart doesn't exist.
    pub async fn save_items(&self, id: CartId, items: &[CartLine]) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE carts SET items = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(Json(items))
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Empty a cart, keeping the row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, id: CartId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET items = '[]'::jsonb, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Store merged lines on the user cart and drop the session cart, in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[instrument(skip(self, items), fields(cart_id = %user_cart, session_cart = %session_cart))]
    pub async fn save_merged(
        &self,
        user_cart: CartId,
        items: &[CartLine],
        session_cart: CartId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE carts SET items = $2, updated_at = now() WHERE id = $1")
            .bind(user_cart)
            .bind(Json(items))
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(session_cart)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

//! Cart service.
//!
//! Carts store product references and quantities only. Prices, names and
//! availability are read from the catalog every time a cart is viewed, so a
//! cart never shows a stale price.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use emporium_core::{CurrencyCode, LineAmount, ProductId, UserId};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::cart::{CartItemView, CartLine, CartOwnerKey, CartView};
use crate::models::product::Product;

/// Upper bound for a single line, whatever the stock.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("only {available} of product {product_id} in stock")]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
    },

    #[error("product {0} is not in the cart")]
    ItemNotFound(ProductId),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cart operations for one request.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
    currency: CurrencyCode,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, currency: CurrencyCode) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
            currency,
        }
    }

    /// The owner's cart, priced at current catalog prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the database operation fails.
    pub async fn view(&self, owner: &CartOwnerKey) -> Result<CartView, CartError> {
        match self.carts.find_by_owner(owner).await? {
            Some(cart) => self.price(&cart.items).await,
            None => Ok(CartView::empty(self.currency)),
        }
    }

    /// Add units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `quantity` is out of range.
    /// Returns `CartError::ProductUnavailable` if the product is missing or inactive.
    /// Returns `CartError::InsufficientStock` if the resulting line exceeds stock.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        owner: &CartOwnerKey,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let quantity = check_quantity(quantity)?;
        let product = self.active_product(product_id).await?;

        let cart = self.carts.get_or_create(owner).await?;
        let mut items = cart.items;
        let existing = items
            .iter()
            .find(|l| l.product_id == product_id)
            .map_or(0, |l| l.quantity);
        check_stock(&product, existing.saturating_add(quantity))?;

        apply_add(&mut items, product_id, quantity, Utc::now());
        self.carts.save_items(cart.id, &items).await?;
        self.price(&items).await
    }

    /// Set the quantity of a line already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the product is not in the cart.
    /// Returns `CartError::InsufficientStock` if `quantity` exceeds stock.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_item(
        &self,
        owner: &CartOwnerKey,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let quantity = check_quantity(quantity)?;
        let cart = self
            .carts
            .find_by_owner(owner)
            .await?
            .ok_or(CartError::ItemNotFound(product_id))?;

        let mut items = cart.items;
        let line = items
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::ItemNotFound(product_id))?;

        let product = self.active_product(product_id).await?;
        check_stock(&product, quantity)?;
        line.quantity = quantity;

        self.carts.save_items(cart.id, &items).await?;
        self.price(&items).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the product is not in the cart.
    pub async fn remove_item(
        &self,
        owner: &CartOwnerKey,
        product_id: ProductId,
    ) -> Result<CartView, CartError> {
        let cart = self
            .carts
            .find_by_owner(owner)
            .await?
            .ok_or(CartError::ItemNotFound(product_id))?;

        let mut items = cart.items;
        let before = items.len();
        items.retain(|l| l.product_id != product_id);
        if items.len() == before {
            return Err(CartError::ItemNotFound(product_id));
        }

        self.carts.save_items(cart.id, &items).await?;
        self.price(&items).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the database operation fails.
    pub async fn clear(&self, owner: &CartOwnerKey) -> Result<CartView, CartError> {
        match (owner, self.carts.find_by_owner(owner).await?) {
            (CartOwnerKey::User(_), Some(cart)) => self.carts.clear(cart.id).await?,
            (CartOwnerKey::Session(_), Some(cart)) => self.carts.delete(cart.id).await?,
            (_, None) => {}
        }
        Ok(CartView::empty(self.currency))
    }

    /// Fold an anonymous session cart into the user's cart and delete it.
    ///
    /// Quantities for the same product are added and capped at current
    /// stock; lines for unavailable products are dropped.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the database operation fails.
    #[instrument(skip(self, session_id), fields(user_id = %user))]
    pub async fn merge(&self, user: UserId, session_id: &str) -> Result<CartView, CartError> {
        let user_key = CartOwnerKey::User(user);
        let Some(session_cart) = self
            .carts
            .find_by_owner(&CartOwnerKey::Session(session_id.to_string()))
            .await?
        else {
            return self.view(&user_key).await;
        };

        let user_cart = self.carts.get_or_create(&user_key).await?;

        let ids: Vec<ProductId> = user_cart
            .items
            .iter()
            .chain(&session_cart.items)
            .map(|l| l.product_id)
            .collect();
        let stock: HashMap<ProductId, u32> = self
            .products
            .get_many(&ids)
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| (p.id, u32::try_from(p.stock).unwrap_or(0)))
            .collect();

        let session_lines = session_cart.items.len();
        let merged = merge_lines(user_cart.items, session_cart.items, &stock);
        self.carts
            .save_merged(user_cart.id, &merged, session_cart.id)
            .await?;

        info!(session_lines, merged_lines = merged.len(), "Merged session cart");
        self.price(&merged).await
    }

    async fn active_product(&self, id: ProductId) -> Result<Product, CartError> {
        self.products
            .get_active(id)
            .await?
            .ok_or(CartError::ProductUnavailable(id))
    }

    async fn price(&self, lines: &[CartLine]) -> Result<CartView, CartError> {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = self.products.get_many(&ids).await?;
        Ok(price_lines(lines, &products, self.currency))
    }
}

fn check_quantity(quantity: i64) -> Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
        .ok_or(CartError::InvalidQuantity)
}

fn check_stock(product: &Product, wanted: u32) -> Result<(), CartError> {
    if product.can_fulfil(wanted) {
        Ok(())
    } else {
        Err(CartError::InsufficientStock {
            product_id: product.id,
            available: product.stock.max(0),
        })
    }
}

/// Add `quantity` units to the line for `product_id`, or append a new line.
pub fn apply_add(lines: &mut Vec<CartLine>, product_id: ProductId, quantity: u32, now: DateTime<Utc>) {
    if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
        line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
    } else {
        lines.push(CartLine {
            product_id,
            quantity,
            added_at: now,
        });
    }
}

/// Merge session lines into user lines.
///
/// Only products present in `stock` (the active ones) survive. Each line is
/// capped at the available stock; lines that end up empty are dropped.
#[must_use]
pub fn merge_lines(
    user: Vec<CartLine>,
    session: Vec<CartLine>,
    stock: &HashMap<ProductId, u32>,
) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(user.len() + session.len());

    for line in user.into_iter().chain(session) {
        if let Some(existing) = merged.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
            existing.added_at = existing.added_at.min(line.added_at);
        } else {
            merged.push(line);
        }
    }

    merged
        .into_iter()
        .filter_map(|mut line| {
            let available = stock.get(&line.product_id).copied().unwrap_or(0);
            line.quantity = line.quantity.min(available).min(MAX_LINE_QUANTITY);
            (line.quantity > 0).then_some(line)
        })
        .collect()
}

/// Price stored lines against current products.
///
/// Lines whose product no longer exists are left out. Unavailable lines are
/// listed but do not count towards the subtotal.
#[must_use]
pub fn price_lines(lines: &[CartLine], products: &[Product], currency: CurrencyCode) -> CartView {
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let items: Vec<CartItemView> = lines
        .iter()
        .filter_map(|line| {
            let product = by_id.get(&line.product_id)?;
            Some(CartItemView {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total: LineAmount::new(product.price, line.quantity).total(),
                image_url: product.thumbnail().map(str::to_string),
                stock: product.stock,
                available: product.can_fulfil(line.quantity),
            })
        })
        .collect();

    let subtotal: Decimal = items
        .iter()
        .filter(|i| i.available)
        .map(|i| i.line_total)
        .sum();
    let item_count = items.iter().map(|i| i.quantity).sum();

    CartView {
        items,
        item_count,
        subtotal,
        currency,
    }
}

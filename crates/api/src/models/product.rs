//! Catalog domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::{PageParams, ProductId, round_money};

use super::CurrentUser;

/// A catalog product.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub brand: String,
    pub sku: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be sold right now.
    #[must_use]
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.is_active && i64::from(self.stock) >= i64::from(quantity)
    }

    /// First image, used as the thumbnail.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }
}

/// Payload for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

const fn default_active() -> bool {
    true
}

impl NewProduct {
    /// Check ranges and trim text fields.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_string();
        self.brand = self.brand.trim().to_string();
        self.sku = self.sku.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        validate_name(&self.name)?;
        self.price = validate_price(self.price)?;
        validate_stock(self.stock)?;
        validate_images(&self.image_urls)?;
        Ok(self)
    }
}

/// Partial update for a product. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub image_urls: Option<Vec<String>>,
}

impl ProductUpdate {
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(mut self) -> Result<Self, String> {
        if let Some(name) = &mut self.name {
            *name = name.trim().to_string();
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            self.price = Some(validate_price(price)?);
        }
        if let Some(stock) = self.stock {
            validate_stock(stock)?;
        }
        if let Some(images) = &self.image_urls {
            validate_images(images)?;
        }
        Ok(self)
    }

    /// Apply the changes to a loaded product.
    #[must_use]
    pub fn apply(self, mut product: Product) -> Product {
        if let Some(v) = self.name {
            product.name = v;
        }
        if let Some(v) = self.description {
            product.description = v;
        }
        if let Some(v) = self.price {
            product.price = v;
        }
        if let Some(v) = self.category {
            product.category = v.trim().to_string();
        }
        if let Some(v) = self.brand {
            product.brand = v.trim().to_string();
        }
        if let Some(v) = self.sku {
            let v = v.trim().to_string();
            product.sku = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = self.stock {
            product.stock = v;
        }
        if let Some(v) = self.is_active {
            product.is_active = v;
        }
        if let Some(v) = self.image_urls {
            product.image_urls = v;
        }
        product
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is required".to_string());
    }
    if name.chars().count() > 200 {
        return Err("name must be at most 200 characters".to_string());
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<Decimal, String> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err("price must not be negative".to_string());
    }
    Ok(round_money(price))
}

fn validate_stock(stock: i32) -> Result<(), String> {
    if stock < 0 {
        return Err("stock must not be negative".to_string());
    }
    Ok(())
}

fn validate_images(urls: &[String]) -> Result<(), String> {
    if urls.len() > 12 {
        return Err("at most 12 images per product".to_string());
    }
    if urls.iter().any(|u| u.trim().is_empty()) {
        return Err("image URLs must not be empty".to_string());
    }
    Ok(())
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    /// Search rank when a query is given, newest otherwise.
    Relevance,
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

/// Listing filters, taken from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Free-text query (web search syntax).
    pub q: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Also list deactivated products. Honored for admins only.
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductFilter {
    /// Drop blank strings and swap an inverted price range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self.q = clean(self.q);
        self.category = clean(self.category);
        self.brand = clean(self.brand);
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            self.min_price = Some(max);
            self.max_price = Some(min);
        }
        self
    }

    /// Limit the filter to what `user` may see.
    #[must_use]
    pub fn visible_to(mut self, user: Option<&CurrentUser>) -> Self {
        self.include_inactive &= user.is_some_and(CurrentUser::is_admin);
        self
    }

    /// Paging parameters with defaults applied.
    #[must_use]
    pub fn page_params(&self) -> PageParams {
        let defaults = PageParams::default();
        PageParams::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

/// A category or brand with the number of active products in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FacetCount {
    pub name: String,
    pub products: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(stock: i32, active: bool) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Kettle".into(),
            description: String::new(),
            price: Decimal::new(2999, 2),
            category: "Kitchen".into(),
            brand: "Acme".into(),
            sku: None,
            stock,
            is_active: active,
            image_urls: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_can_fulfil() {
        assert!(product(3, true).can_fulfil(3));
        assert!(!product(3, true).can_fulfil(4));
        assert!(!product(3, false).can_fulfil(1));
    }

    #[test]
    fn test_new_product_validation() {
        let input: NewProduct =
            serde_json::from_str(r#"{"name":"  Mug ","price":"4.555","sku":"  "}"#).unwrap();
        let product = input.validate().unwrap();
        assert_eq!(product.name, "Mug");
        assert_eq!(product.price, Decimal::new(456, 2));
        assert!(product.sku.is_none());
        assert!(product.is_active);

        let negative: NewProduct =
            serde_json::from_str(r#"{"name":"Mug","price":"-1"}"#).unwrap();
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_update_apply() {
        let update = ProductUpdate {
            price: Some(Decimal::new(1999, 2)),
            stock: Some(0),
            sku: Some(String::new()),
            ..ProductUpdate::default()
        }
        .validate()
        .unwrap();

        let updated = update.apply(product(5, true));
        assert_eq!(updated.price, Decimal::new(1999, 2));
        assert_eq!(updated.stock, 0);
        assert!(updated.sku.is_none());
        assert_eq!(updated.name, "Kettle");
    }

    #[test]
    fn test_update_rejects_negative_stock() {
        let update = ProductUpdate {
            stock: Some(-1),
            ..ProductUpdate::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_filter_normalization() {
        let filter = ProductFilter {
            q: Some("   ".into()),
            min_price: Some(Decimal::new(50, 0)),
            max_price: Some(Decimal::new(10, 0)),
            ..ProductFilter::default()
        }
        .normalized();

        assert!(filter.q.is_none());
        assert_eq!(filter.min_price, Some(Decimal::new(10, 0)));
        assert_eq!(filter.max_price, Some(Decimal::new(50, 0)));
        assert_eq!(filter.page_params(), PageParams::default());
    }

    #[test]
    fn test_inactive_listing_is_admin_only() {
        let uri: axum::http::Uri = "/?include_inactive=true&category=Kitchen".parse().unwrap();
        let axum::extract::Query(filter) =
            axum::extract::Query::<ProductFilter>::try_from_uri(&uri).unwrap();
        assert!(filter.include_inactive);

        let admin = CurrentUser {
            id: emporium_core::UserId::new(1),
            email: "admin@example.com".into(),
            role: emporium_core::UserRole::Admin,
        };
        let customer = CurrentUser {
            role: emporium_core::UserRole::User,
            ..admin.clone()
        };

        assert!(filter.clone().visible_to(Some(&admin)).include_inactive);
        assert!(!filter.clone().visible_to(Some(&customer)).include_inactive);
        assert!(!filter.visible_to(None).include_inactive);
    }
}

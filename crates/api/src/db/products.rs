//! Product repository for catalog operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use emporium_core::ProductId;

use super::RepositoryError;
use crate::models::product::{FacetCount, NewProduct, Product, ProductFilter, ProductSort};

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, brand, sku, stock, \
                               is_active, image_urls, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Decimal,
    category: String,
    brand: String,
    sku: Option<String>,
    stock: i32,
    is_active: bool,
    image_urls: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            price: r.price,
            category: r.category,
            brand: r.brand,
            sku: r.sku,
            stock: r.stock,
            is_active: r.is_active,
            image_urls: r.image_urls,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a validated product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the SKU is already taken.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row: ProductRow = sqlx::query_as(&format!(
            r"
            INSERT INTO products
                (name, description, price, category, brand, sku, stock, is_active, image_urls)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.sku.as_deref())
        .bind(product.stock)
        .bind(product.is_active)
        .bind(&product.image_urls)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "sku"))?;

        Ok(row.into())
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(Product::from))
    }

    /// Get a product by ID if it is on sale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND is_active"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Load several products at once. Missing IDs are simply absent from
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Persist every field of an already-updated product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the SKU is already taken.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn update(&self, product: &Product) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            r"
            UPDATE products
            SET name = $2, description = $3, price = $4, category = $5, brand = $6,
                sku = $7, stock = $8, is_active = $9, image_urls = $10, updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.sku.as_deref())
        .bind(product.stock)
        .bind(product.is_active)
        .bind(&product.image_urls)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "sku"))?;

        row.map(Product::from).ok_or(RepositoryError::NotFound)
    }

    /// Take a product off sale. Orders keep referencing it, so rows are
    /// never removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE products SET is_active = FALSE, updated_at = now() WHERE id = $1")
                .bind(id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Filtered, sorted and paged listing. Returns the page and the total
    /// number of matches.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, filter), fields(q = ?filter.q, category = ?filter.category))]
    pub async fn search(
        &self,
        filter: &ProductFilter,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let page = filter.page_params();

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));
        push_filters(&mut query, filter);
        push_order(&mut query, filter);
        query.push(" LIMIT ").push_bind(page.limit());
        query.push(" OFFSET ").push_bind(page.offset());

        let rows: Vec<ProductRow> = query.build_query_as().fetch_all(self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_filters(&mut count, filter);
        let total: (i64,) = count.build_query_as().fetch_one(self.pool).await?;

        Ok((rows.into_iter().map(Product::from).collect(), total.0))
    }

    /// Categories of active products, with counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<FacetCount>, RepositoryError> {
        let rows = sqlx::query_as(
            r"
            SELECT category AS name, COUNT(*) AS products
            FROM products
            WHERE is_active AND category <> ''
            GROUP BY category
            ORDER BY category
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Brands of active products, with counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn brands(&self) -> Result<Vec<FacetCount>, RepositoryError> {
        let rows = sqlx::query_as(
            r"
            SELECT brand AS name, COUNT(*) AS products
            FROM products
            WHERE is_active AND brand <> ''
            GROUP BY brand
            ORDER BY brand
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Active products with `stock <= threshold`, lowest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(&self, threshold: i32) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE is_active AND stock <= $1
            ORDER BY stock, name
            LIMIT 100
            "
        ))
        .bind(threshold)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if !filter.include_inactive {
        query.push(" AND is_active");
    }
    if let Some(q) = &filter.q {
        query
            .push(" AND search_vector @@ websearch_to_tsquery('english', ")
            .push_bind(q.clone())
            .push(")");
    }
    if let Some(category) = &filter.category {
        query
            .push(" AND lower(category) = lower(")
            .push_bind(category.clone())
            .push(")");
    }
    if let Some(brand) = &filter.brand {
        query
            .push(" AND lower(brand) = lower(")
            .push_bind(brand.clone())
            .push(")");
    }
    if let Some(min) = filter.min_price {
        query.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND price <= ").push_bind(max);
    }
    if filter.in_stock {
        query.push(" AND stock > 0");
    }
}

fn push_order(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    match (filter.sort, &filter.q) {
        (ProductSort::Relevance, Some(q)) => {
            query
                .push(" ORDER BY ts_rank(search_vector, websearch_to_tsquery('english', ")
                .push_bind(q.clone())
                .push(")) DESC, id DESC");
        }
        (ProductSort::Relevance | ProductSort::Newest, _) => {
            query.push(" ORDER BY created_at DESC, id DESC");
        }
        (ProductSort::PriceAsc, _) => {
            query.push(" ORDER BY price ASC, id ASC");
        }
        (ProductSort::PriceDesc, _) => {
            query.push(" ORDER BY price DESC, id DESC");
        }
        (ProductSort::Name, _) => {
            query.push(" ORDER BY lower(name) ASC, id ASC");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(filter: &ProductFilter) -> String {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM products WHERE TRUE");
        push_filters(&mut query, filter);
        push_order(&mut query, filter);
        query.sql().to_string()
    }

    #[test]
    fn test_default_listing_hides_inactive() {
        let sql = sql(&ProductFilter::default());
        assert!(sql.contains("AND is_active"));
        assert!(sql.ends_with("ORDER BY created_at DESC, id DESC"));
    }

    #[test]
    fn test_filters_are_bound_not_interpolated() {
        let filter = ProductFilter {
            q: Some("red'; DROP TABLE products".into()),
            category: Some("Kitchen".into()),
            min_price: Some(Decimal::new(10, 0)),
            in_stock: true,
            sort: ProductSort::Relevance,
            include_inactive: true,
            ..ProductFilter::default()
        };
        let sql = sql(&filter);

        assert!(!sql.contains("DROP TABLE"));
        assert!(!sql.contains("AND is_active"));
        assert!(sql.contains("websearch_to_tsquery('english', $1)"));
        assert!(sql.contains("lower(category) = lower($2)"));
        assert!(sql.contains("price >= $3"));
        assert!(sql.contains("stock > 0"));
        assert!(sql.contains("ts_rank(search_vector, websearch_to_tsquery('english', $4)) DESC"));
    }

    #[test]
    fn test_relevance_without_query_falls_back_to_newest() {
        let filter = ProductFilter {
            sort: ProductSort::Relevance,
            ..ProductFilter::default()
        };
        assert!(sql(&filter).ends_with("ORDER BY created_at DESC, id DESC"));
    }
}

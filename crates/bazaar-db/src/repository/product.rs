//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - CRUD with soft delete
//! - SKU and slug uniqueness among live products
//! - Name/SKU search
//!
//! ## Slugs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "Mango Juice 1L"  ──► slugify ──► "mango-juice-1l"                    │
//! │                                        │                                │
//! │                     taken by a live product?                           │
//! │                        yes ──► "mango-juice-1l-1", "-2", ...           │
//! │                                                                         │
//! │  Stock is never stored on the product; it is the sum of the            │
//! │  product's inventory transactions.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use bazaar_core::validation::{slugify, unique_slug, validate_name, validate_non_negative, validate_sku};
use bazaar_core::{new_id, NewProduct, Product};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::accounts::ensure_unique;
use super::begin_write;
use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, name, slug, sku, category, brand, unit, price, cost, is_active, \
     created_by, created_at, updated_at, deleted_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// let results = repo.search("mango", 20).await?;
/// let product = repo.get_by_id("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

fn validate(product: &NewProduct) -> DbResult<()> {
    validate_name("name", &product.name)?;
    validate_sku(&product.sku)?;
    validate_non_negative("price", product.price)?;
    validate_non_negative("cost", product.cost)?;
    Ok(())
}

/// Free slug for `name`, ignoring the product being edited.
async fn free_slug(conn: &mut SqliteConnection, name: &str, except_id: Option<&str>) -> DbResult<String> {
    let base = slugify(name);
    let taken: HashSet<String> = sqlx::query_scalar(
        "SELECT slug FROM products WHERE (slug = ?1 OR slug LIKE ?1 || '-%') \
         AND deleted_at IS NULL AND (?2 IS NULL OR id <> ?2)",
    )
    .bind(&base)
    .bind(except_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    Ok(unique_slug(&base, |slug| taken.contains(slug)))
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product with a fresh slug.
    ///
    /// ## Errors
    /// - Duplicate SKU among live products
    /// - Invalid name, SKU or negative price/cost
    pub async fn insert(&self, product: &NewProduct, created_by: Option<&str>) -> DbResult<Product> {
        validate(product)?;
        let mut tx = begin_write(&self.pool).await?;

        let sku = product.sku.trim().to_string();
        ensure_unique(&mut tx, "products", "sku", &sku, None).await?;
        let slug = free_slug(&mut tx, &product.name, None).await?;

        let now = Utc::now();
        let created = Product {
            id: new_id(),
            name: product.name.trim().to_string(),
            slug,
            sku,
            category: product.category.clone(),
            brand: product.brand.clone(),
            unit: product.unit.clone(),
            price: product.price,
            cost: product.cost,
            is_active: true,
            created_by: created_by.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        debug!(id = %created.id, sku = %created.sku, "Inserting product");

        sqlx::query(
            "INSERT INTO products (id, name, slug, sku, category, brand, unit, price, cost, is_active, \
             created_by, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&created.id)
        .bind(&created.name)
        .bind(&created.slug)
        .bind(&created.sku)
        .bind(&created.category)
        .bind(&created.brand)
        .bind(&created.unit)
        .bind(created.price)
        .bind(created.cost)
        .bind(created.is_active)
        .bind(&created.created_by)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    /// Updates a product. The slug is regenerated when the name changes.
    pub async fn update(&self, id: &str, product: &NewProduct) -> DbResult<Product> {
        validate(product)?;
        let mut tx = begin_write(&self.pool).await?;

        let current = fetch(&mut tx, id).await?;
        let sku = product.sku.trim().to_string();
        ensure_unique(&mut tx, "products", "sku", &sku, Some(id)).await?;
        let slug = if current.name == product.name.trim() {
            current.slug
        } else {
            free_slug(&mut tx, &product.name, Some(id)).await?
        };

        sqlx::query(
            "UPDATE products SET name = ?2, slug = ?3, sku = ?4, category = ?5, brand = ?6, unit = ?7, \
             price = ?8, cost = ?9, updated_at = ?10 WHERE id = ?1",
        )
        .bind(id)
        .bind(product.name.trim())
        .bind(&slug)
        .bind(&sku)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.unit)
        .bind(product.price)
        .bind(product.cost)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let updated = fetch(&mut tx, id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Gets a live product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE id = ?1 AND deleted_at IS NULL",
            PRODUCT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Lists active products by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND deleted_at IS NULL ORDER BY name LIMIT ?1",
            PRODUCT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Searches active products by name or SKU prefix.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        if query.is_empty() {
            return self.list_active(limit).await;
        }

        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND deleted_at IS NULL \
             AND (name LIKE '%' || ?1 || '%' OR sku LIKE ?1 || '%') ORDER BY name LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Soft-deletes a product. Its SKU and slug become free again.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE products SET deleted_at = ?2, is_active = 0, updated_at = ?2 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        debug!(id = %id, "Product deleted");
        Ok(())
    }

    /// Counts live products.
    pub async fn count(&self) -> DbResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    let sql = format!(
        "SELECT {} FROM products WHERE id = ?1 AND deleted_at IS NULL",
        PRODUCT_COLUMNS
    );
    sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use bazaar_core::Money;

    fn new_product(name: &str, sku: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            sku: sku.into(),
            category: Some("Beverage".into()),
            brand: None,
            unit: Some("pcs".into()),
            price: Money::from_minor(12_000),
            cost: Money::from_minor(9_500),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(&new_product("Mango Juice 1L", "MJ-1"), None).await.unwrap();

        assert_eq!(product.slug, "mango-juice-1l");
        let fetched = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.price, Money::from_minor(12_000));
        assert_eq!(db.products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_get_numbered_slugs() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.products().insert(&new_product("Tea", "TEA-1"), None).await.unwrap();
        let b = db.products().insert(&new_product("Tea", "TEA-2"), None).await.unwrap();
        let c = db.products().insert(&new_product("Tea", "TEA-3"), None).await.unwrap();

        assert_eq!(a.slug, "tea");
        assert_eq!(b.slug, "tea-1");
        assert_eq!(c.slug, "tea-2");
    }

    #[tokio::test]
    async fn test_sku_unique_among_live_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = db.products().insert(&new_product("Cola", "COLA"), None).await.unwrap();
        assert!(db.products().insert(&new_product("Cola Zero", "COLA"), None).await.is_err());

        db.products().soft_delete(&first.id).await.unwrap();
        let again = db.products().insert(&new_product("Cola", "COLA"), None).await.unwrap();
        assert_eq!(again.slug, "cola");
    }

    #[tokio::test]
    async fn test_update_and_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(&new_product("Green Tea", "GT-1"), None).await.unwrap();

        let mut edit = new_product("Jasmine Tea", "GT-1");
        edit.price = Money::from_minor(15_000);
        let updated = db.products().update(&product.id, &edit).await.unwrap();
        assert_eq!(updated.slug, "jasmine-tea");
        assert_eq!(updated.price, Money::from_minor(15_000));

        assert_eq!(db.products().search("jasm", 10).await.unwrap().len(), 1);
        assert_eq!(db.products().search("GT", 10).await.unwrap().len(), 1);
        assert!(db.products().search("coffee", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut bad = new_product("Bad", "BAD");
        bad.price = Money::from_minor(-1);
        assert!(db.products().insert(&bad, None).await.is_err());
    }
}

//! # Catalog Repository
//!
//! Read side of the product catalog, as seen by checkout.
//!
//! The catalog itself (CRUD, images, categories) is owned elsewhere; this
//! repository only loads the fields checkout needs and offers inserts for
//! the seed tool and tests. Stock is never written here: decrements and
//! restocks happen inside [`super::order::OrderRepository`] transactions.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use checkstand_core::{CartLine, CatalogSnapshot, ProductSnapshot, VariantSnapshot};

const PRODUCT_COLUMNS: &str = "id, name, slug, price_cents, in_stock, stock_quantity, primary_image_url";
const VARIANT_COLUMNS: &str =
    "id, product_id, name, value, sku, price_override_cents, in_stock, image_url";

/// A product to insert (seed tool, tests).
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub in_stock: bool,
    pub stock_quantity: Option<i64>,
    pub primary_image_url: Option<String>,
}

impl NewProduct {
    /// An in-stock product. `stock_quantity: None` means untracked.
    pub fn new(name: &str, slug: &str, price_cents: i64, stock_quantity: Option<i64>) -> Self {
        NewProduct {
            name: name.to_string(),
            slug: slug.to_string(),
            price_cents,
            in_stock: true,
            stock_quantity,
            ..Default::default()
        }
    }
}

/// A variant to insert.
#[derive(Debug, Clone, Default)]
pub struct NewVariant {
    pub product_id: String,
    pub name: String,
    pub value: String,
    pub sku: Option<String>,
    pub price_override_cents: Option<i64>,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets an active product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<ProductSnapshot>> {
        let sql = format!(
            "SELECT {} FROM products WHERE id = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, ProductSnapshot>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a variant by ID.
    pub async fn get_variant(&self, id: &str) -> DbResult<Option<VariantSnapshot>> {
        let sql = format!("SELECT {} FROM product_variants WHERE id = ?1", VARIANT_COLUMNS);
        let variant = sqlx::query_as::<_, VariantSnapshot>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(variant)
    }

    /// Loads current catalog state for every product and variant a cart
    /// references, in two queries.
    ///
    /// Unknown and inactive products are simply absent from the snapshot;
    /// the validator reports them as `NotFound`.
    pub async fn snapshot_for(&self, lines: &[CartLine]) -> DbResult<CatalogSnapshot> {
        let product_ids: BTreeSet<&str> = lines.iter().map(|l| l.product_id.as_str()).collect();
        let variant_ids: BTreeSet<&str> = lines
            .iter()
            .filter_map(|l| l.variant_id.as_deref())
            .collect();

        debug!(
            products = product_ids.len(),
            variants = variant_ids.len(),
            "Loading catalog snapshot"
        );

        let mut snapshot = CatalogSnapshot::new();

        if !product_ids.is_empty() {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM products WHERE is_active = 1 AND id IN (",
                PRODUCT_COLUMNS
            ));
            let mut ids = query.separated(", ");
            for id in &product_ids {
                ids.push_bind(id.to_string());
            }
            ids.push_unseparated(")");

            let products = query
                .build_query_as::<ProductSnapshot>()
                .fetch_all(&self.pool)
                .await?;
            for product in products {
                snapshot = snapshot.with_product(product);
            }
        }

        if !variant_ids.is_empty() {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM product_variants WHERE id IN (",
                VARIANT_COLUMNS
            ));
            let mut ids = query.separated(", ");
            for id in &variant_ids {
                ids.push_bind(id.to_string());
            }
            ids.push_unseparated(")");

            let variants = query
                .build_query_as::<VariantSnapshot>()
                .fetch_all(&self.pool)
                .await?;
            for variant in variants {
                snapshot = snapshot.with_variant(variant);
            }
        }

        Ok(snapshot)
    }

    /// Current stock of a product. `Ok(None)` means untracked.
    pub async fn stock_quantity(&self, id: &str) -> DbResult<Option<i64>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(stock,)| stock)
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<ProductSnapshot> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(id = %id, slug = %product.slug, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, slug, description, price_cents,
                in_stock, stock_quantity, primary_image_url, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.in_stock)
        .bind(product.stock_quantity)
        .bind(&product.primary_image_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ProductSnapshot {
            id,
            name: product.name.clone(),
            slug: product.slug.clone(),
            price_cents: product.price_cents,
            in_stock: product.in_stock,
            stock_quantity: product.stock_quantity,
            primary_image_url: product.primary_image_url.clone(),
        })
    }

    /// Inserts a variant.
    pub async fn insert_variant(&self, variant: &NewVariant) -> DbResult<VariantSnapshot> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, name, value, sku,
                price_override_cents, in_stock, image_url, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(&variant.product_id)
        .bind(&variant.name)
        .bind(&variant.value)
        .bind(&variant.sku)
        .bind(variant.price_override_cents)
        .bind(variant.in_stock)
        .bind(&variant.image_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(VariantSnapshot {
            id,
            product_id: variant.product_id.clone(),
            name: variant.name.clone(),
            value: variant.value.clone(),
            sku: variant.sku.clone(),
            price_override_cents: variant.price_override_cents,
            in_stock: variant.in_stock,
            image_url: variant.image_url.clone(),
        })
    }

    /// Changes a product's price (catalog edits happen between preview and
    /// checkout in real life; tests use this to simulate them).
    pub async fn set_price(&self, id: &str, price_cents: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deletes a product. Past orders keep referencing it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics and the seed tool).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn line(product_id: &str, variant_id: Option<&str>) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            variant_id: variant_id.map(str::to_string),
            quantity: 1,
            unit_price_cents: 0,
        }
    }

    #[tokio::test]
    async fn test_snapshot_loads_products_and_variants() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let shirt = catalog
            .insert_product(&NewProduct::new("Shirt", "shirt", 2500, Some(10)))
            .await
            .unwrap();
        let mug = catalog
            .insert_product(&NewProduct::new("Mug", "mug", 1200, None))
            .await
            .unwrap();
        let large = catalog
            .insert_variant(&NewVariant {
                product_id: shirt.id.clone(),
                name: "Size".to_string(),
                value: "L".to_string(),
                price_override_cents: Some(2800),
                in_stock: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let snapshot = catalog
            .snapshot_for(&[
                line(&shirt.id, Some(&large.id)),
                line(&mug.id, None),
                line("missing", None),
            ])
            .await
            .unwrap();

        assert_eq!(snapshot.products.len(), 2);
        assert_eq!(snapshot.products[&shirt.id].stock_quantity, Some(10));
        assert_eq!(snapshot.products[&mug.id].stock_quantity, None);
        assert_eq!(snapshot.variants[&large.id].price_override_cents, Some(2800));
        assert!(!snapshot.products.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_inactive_products_are_invisible() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let product = catalog
            .insert_product(&NewProduct::new("Old", "old", 100, Some(1)))
            .await
            .unwrap();
        catalog.deactivate(&product.id).await.unwrap();

        assert!(catalog.get_product(&product.id).await.unwrap().is_none());
        let snapshot = catalog.snapshot_for(&[line(&product.id, None)]).await.unwrap();
        assert!(snapshot.products.is_empty());
        assert_eq!(catalog.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stock_quantity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let tracked = catalog
            .insert_product(&NewProduct::new("A", "a", 100, Some(3)))
            .await
            .unwrap();
        let untracked = catalog
            .insert_product(&NewProduct::new("B", "b", 100, None))
            .await
            .unwrap();

        assert_eq!(catalog.stock_quantity(&tracked.id).await.unwrap(), Some(3));
        assert_eq!(catalog.stock_quantity(&untracked.id).await.unwrap(), None);
        assert!(matches!(
            catalog.stock_quantity("nope").await,
            Err(DbError::NotFound { .. })
        ));
    }
}

//! # Product Repository
//!
//! Database operations for products, their images and (inline) variants.
//!
//! ## Inline Editing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Admin form: product fields + variant rows + image rows                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  save_with_inlines(product, variants, images)                           │
//! │       │                                                                 │
//! │       │  BEGIN                                                          │
//! │       ├── upsert product                                                │
//! │       ├── upsert each variant (+ inventory row if new)                  │
//! │       ├── delete variants no longer on the form                         │
//! │       ├── upsert each image                                             │
//! │       ├── delete images no longer on the form                           │
//! │       │  COMMIT                                                         │
//! │       ▼                                                                 │
//! │  ProductDetail { product, variants, images }                            │
//! │                                                                         │
//! │  Any invalid row → nothing is written                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use shopkit_core::validation::{validate_amount_cents, validate_name, validate_slug};
use shopkit_core::{Product, ProductImage, ProductStatus, ProductVariant, ValidationError};

use crate::admin::{fetch_page, like_pattern, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};
use crate::repository::variant::{upsert_variant, validate_variant, variants_of};

const LIST: ListSpec = ListSpec {
    table: "products",
    columns: "*",
    search: &["name", "slug"],
    status: Some(Clause::eq("status = ")),
    sku: Some(Clause {
        open: "id IN (SELECT product_id FROM product_variants WHERE sku = ",
        close: ")",
    }),
    category: Some(Clause::eq("category_id = ")),
    order_by: "name",
};

/// A product with everything edited alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
    pub images: Vec<ProductImage>,
}

/// Repository for product database operations.
///
/// ```rust,ignore
/// let repo = db.products();
/// let results = repo.search("tee", 20).await?;
/// let detail = repo.detail(&results[0].id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Searches active products by name, slug or variant SKU.
    ///
    /// An empty query lists active products, featured first.
    pub async fn search(&self, query: &str, limit: i64) -> DbResult<Vec<Product>> {
        let query = query.trim();

        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = like_pattern(query);
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE status = 'active'
            AND (
                ?1 = ''
                OR name LIKE ?2 ESCAPE '\'
                OR slug LIKE ?2 ESCAPE '\'
                OR id IN (
                    SELECT product_id FROM product_variants
                    WHERE sku LIKE ?2 ESCAPE '\'
                )
            )
            ORDER BY is_featured DESC, name
            LIMIT ?3
            "#,
        )
        .bind(query)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Product with variants and images, or `None`.
    pub async fn detail(&self, id: &str) -> DbResult<Option<ProductDetail>> {
        let Some(product) = self.get(id).await? else {
            return Ok(None);
        };

        Ok(Some(ProductDetail {
            variants: variants_of(&self.pool, id).await?,
            images: self.images(id).await?,
            product,
        }))
    }

    /// Images of a product in display order.
    pub async fn images(&self, product_id: &str) -> DbResult<Vec<ProductImage>> {
        let images = sqlx::query_as::<_, ProductImage>(
            r#"
            SELECT * FROM product_images
            WHERE product_id = ?1
            ORDER BY position, created_at
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    /// Adds one image. A new primary image demotes the previous one.
    pub async fn add_image(&self, image: &ProductImage) -> DbResult<ProductImage> {
        validate_image(image)?;

        let mut tx = self.pool.begin().await?;
        if image.is_primary {
            clear_primary(&mut tx, &image.product_id).await?;
        }
        upsert_image(&mut tx, image).await?;
        tx.commit().await?;

        Ok(image.clone())
    }

    pub async fn remove_image(&self, image_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM product_images WHERE id = ?1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ProductImage", image_id));
        }

        Ok(())
    }

    /// Saves a product with its full set of variants and images in one
    /// transaction.
    ///
    /// Rows are matched by id: existing ids are updated, new ids inserted,
    /// and stored variants/images missing from the lists are deleted.
    /// Every variant and image must belong to `product`.
    pub async fn save_with_inlines(
        &self,
        product: &Product,
        variants: &[ProductVariant],
        images: &[ProductImage],
    ) -> DbResult<ProductDetail> {
        validate_product(product)?;
        for variant in variants {
            check_owner("variants", &variant.product_id, &product.id)?;
            validate_variant(variant)?;
        }
        for image in images {
            check_owner("images", &image.product_id, &product.id)?;
            validate_image(image)?;
        }
        if images.iter().filter(|image| image.is_primary).count() > 1 {
            return Err(ValidationError::InvalidFormat {
                field: "images".to_string(),
                reason: "at most one image can be primary".to_string(),
            }
            .into());
        }

        info!(
            product_id = %product.id,
            variants = variants.len(),
            images = images.len(),
            "Saving product with inlines"
        );

        let now = Utc::now();
        let mut product = product.clone();
        product.updated_at = now;

        let mut tx = self.pool.begin().await?;

        upsert_product(&mut tx, &product).await?;

        delete_missing(&mut tx, "product_variants", &product.id, variants.iter().map(|v| v.id.as_str()))
            .await?;
        for variant in variants {
            upsert_variant(&mut tx, variant).await?;
        }

        delete_missing(&mut tx, "product_images", &product.id, images.iter().map(|i| i.id.as_str()))
            .await?;
        for image in images {
            upsert_image(&mut tx, image).await?;
        }

        tx.commit().await?;

        let mut variants = variants.to_vec();
        variants.sort_by(|a, b| a.sku.cmp(&b.sku));
        let mut images = images.to_vec();
        images.sort_by_key(|image| image.position);

        Ok(ProductDetail {
            product,
            variants,
            images,
        })
    }

    /// Counts products with the given status.
    pub async fn count_by_status(&self, status: ProductStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn validate_product(product: &Product) -> DbResult<()> {
    validate_name("name", &product.name)?;
    validate_slug(&product.slug)?;
    validate_amount_cents("base_price_cents", product.base_price_cents)?;
    Ok(())
}

fn validate_image(image: &ProductImage) -> DbResult<()> {
    if image.url.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "url".to_string(),
        }
        .into());
    }
    if image.position < 0 {
        return Err(ValidationError::OutOfRange {
            field: "position".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }
    Ok(())
}

fn check_owner(field: &str, owner: &str, product_id: &str) -> DbResult<()> {
    if owner != product_id {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("row belongs to product {}, not {}", owner, product_id),
        }
        .into());
    }
    Ok(())
}

async fn upsert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, slug, description, category_id,
            base_price_cents, status, is_featured, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            slug = excluded.slug,
            description = excluded.description,
            category_id = excluded.category_id,
            base_price_cents = excluded.base_price_cents,
            status = excluded.status,
            is_featured = excluded.is_featured,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.slug)
    .bind(&product.description)
    .bind(&product.category_id)
    .bind(product.base_price_cents)
    .bind(product.status)
    .bind(product.is_featured)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_image(conn: &mut SqliteConnection, image: &ProductImage) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO product_images (
            id, product_id, url, alt_text, position, is_primary, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            url = excluded.url,
            alt_text = excluded.alt_text,
            position = excluded.position,
            is_primary = excluded.is_primary
        "#,
    )
    .bind(&image.id)
    .bind(&image.product_id)
    .bind(&image.url)
    .bind(&image.alt_text)
    .bind(image.position)
    .bind(image.is_primary)
    .bind(image.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn clear_primary(conn: &mut SqliteConnection, product_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE product_images SET is_primary = 0 WHERE product_id = ?1")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Deletes rows of `table` owned by `product_id` whose id is not in `keep`.
async fn delete_missing<'a>(
    conn: &mut SqliteConnection,
    table: &'static str,
    product_id: &'a str,
    keep: impl Iterator<Item = &'a str>,
) -> DbResult<()> {
    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
    qb.push(table).push(" WHERE product_id = ").push_bind(product_id);

    let keep: Vec<&str> = keep.collect();
    if !keep.is_empty() {
        qb.push(" AND id NOT IN (");
        let mut ids = qb.separated(", ");
        for id in keep {
            ids.push_bind(id);
        }
        ids.push_unseparated(")");
    }

    let result = qb.build().execute(&mut *conn).await?;
    debug!(table, removed = result.rows_affected(), "Removed inline rows");
    Ok(())
}

impl AdminResource for ProductRepository {
    type Record = Product;
    const ENTITY: &'static str = "Product";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Product>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    async fn create(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;
        debug!(slug = %product.slug, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, slug, description, category_id,
                base_price_cents, status, is_featured, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.category_id)
        .bind(product.base_price_cents)
        .bind(product.status)
        .bind(product.is_featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    async fn update(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;
        debug!(id = %product.id, "Updating product");

        let mut updated = product.clone();
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                slug = ?3,
                description = ?4,
                category_id = ?5,
                base_price_cents = ?6,
                status = ?7,
                is_featured = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(&updated.name)
        .bind(&updated.slug)
        .bind(&updated.description)
        .bind(&updated.category_id)
        .bind(updated.base_price_cents)
        .bind(updated.status)
        .bind(updated.is_featured)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &product.id));
        }

        Ok(updated)
    }

    /// Deletes the product with its variants, images and inventory.
    /// Placed orders keep their line snapshots.
    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, id));
        }

        Ok(())
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{image, product, seed_category, test_db, variant};

    #[tokio::test]
    async fn test_product_crud_and_slug_lookup() {
        let db = test_db().await;
        let repo = db.products();

        let p = repo.create(&product("Classic Tee", 1999)).await.unwrap();
        assert_eq!(repo.get_by_slug("classic-tee").await.unwrap().unwrap().id, p.id);

        let mut changed = p.clone();
        changed.base_price_cents = 2499;
        repo.update(&changed).await.unwrap();
        assert_eq!(repo.get(&p.id).await.unwrap().unwrap().base_price_cents, 2499);

        repo.delete(&p.id).await.unwrap();
        assert!(repo.get(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let db = test_db().await;
        let err = db.products().create(&product("Broken", -1)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_save_with_inlines() {
        let db = test_db().await;
        let repo = db.products();

        let p = product("Classic Tee", 1999);
        let small = variant(&p.id, "TEE-S", None);
        let medium = variant(&p.id, "TEE-M", Some(2199));
        let front = image(&p.id, "front.jpg", 0, true);

        let detail = repo
            .save_with_inlines(&p, &[medium.clone(), small.clone()], &[front.clone()])
            .await
            .unwrap();
        assert_eq!(detail.variants[0].sku, "TEE-M");
        assert_eq!(detail.variants.len(), 2);

        // Inventory rows come with new variants
        assert!(db.inventory().get_by_variant(&small.id).await.unwrap().is_some());

        // Second save drops TEE-S and the image, renames the product
        let mut renamed = p.clone();
        renamed.name = "Classic Tee v2".into();
        repo.save_with_inlines(&renamed, &[medium.clone()], &[])
            .await
            .unwrap();

        let stored = repo.detail(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.product.name, "Classic Tee v2");
        assert_eq!(stored.variants.len(), 1);
        assert_eq!(stored.variants[0].price_cents, Some(2199));
        assert!(stored.images.is_empty());
        assert!(db.inventory().get_by_variant(&small.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_with_inlines_is_atomic() {
        let db = test_db().await;
        let repo = db.products();

        let p = product("Classic Tee", 1999);
        repo.create(&p).await.unwrap();

        // Duplicate SKU inside the same save fails at the database
        let mut renamed = p.clone();
        renamed.name = "Should Not Persist".into();
        let err = repo
            .save_with_inlines(
                &renamed,
                &[variant(&p.id, "TEE-M", None), variant(&p.id, "TEE-M", None)],
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let stored = repo.detail(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.product.name, "Classic Tee");
        assert!(stored.variants.is_empty());
    }

    #[tokio::test]
    async fn test_inline_rows_must_belong_to_product() {
        let db = test_db().await;
        let p = product("Classic Tee", 1999);
        let stray = variant("some-other-product", "TEE-M", None);

        assert!(db
            .products()
            .save_with_inlines(&p, &[stray], &[])
            .await
            .is_err());
        assert!(db.products().get(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_primary_image_is_unique() {
        let db = test_db().await;
        let repo = db.products();
        let p = repo.create(&product("Mug", 1200)).await.unwrap();

        repo.add_image(&image(&p.id, "a.jpg", 0, true)).await.unwrap();
        repo.add_image(&image(&p.id, "b.jpg", 1, true)).await.unwrap();

        let images = repo.images(&p.id).await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.iter().filter(|i| i.is_primary).count(), 1);
        assert!(images[1].is_primary);

        repo.remove_image(&images[0].id).await.unwrap();
        assert_eq!(repo.images(&p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_list_filters() {
        let db = test_db().await;
        let repo = db.products();
        let apparel = seed_category(&db, "Apparel").await;

        let mut tee = product("Classic Tee", 1999);
        tee.category_id = Some(apparel.id.clone());
        repo.save_with_inlines(&tee, &[variant(&tee.id, "TEE-M", None)], &[])
            .await
            .unwrap();

        let mut hoodie = product("Hoodie", 4999);
        hoodie.status = ProductStatus::Draft;
        repo.create(&hoodie).await.unwrap();
        repo.create(&product("Mug", 1200)).await.unwrap();

        // search only sees active products; SKUs match too
        assert_eq!(repo.search("tee-m", 10).await.unwrap().len(), 1);
        assert!(repo.search("hoodie", 10).await.unwrap().is_empty());
        assert_eq!(repo.search("", 10).await.unwrap().len(), 2);

        let page = repo
            .list(&ListParams::new().status(ProductStatus::Draft))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Hoodie");

        let page = repo
            .list(&ListParams::new().category_id(&apparel.id))
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let page = repo.list(&ListParams::new().sku("TEE-M")).await.unwrap();
        assert_eq!(page.items[0].id, tee.id);

        let page = repo.list(&ListParams::new().page(2, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more());

        assert_eq!(repo.count_by_status(ProductStatus::Active).await.unwrap(), 2);
    }
}

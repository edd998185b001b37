//! # Variant Repository
//!
//! Purchasable variants (one SKU each) and their typed attributes.
//!
//! ## Attributes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_attributes("TEE-RED-M", { color: Choice(red), size: Choice(M) })   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AttributeRepository::registry()   ← definitions from the database      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AttributeRegistry::validate(map)  ← unknown / wrong kind / bad choice  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  variant_attributes rows replaced in one transaction (value as JSON)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant owns exactly one inventory row, created with the variant.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use shopkit_core::validation::{validate_amount_cents, validate_name, validate_sku};
use shopkit_core::{AttributeMap, AttributeValue, ProductVariant, ValidationError};

use crate::admin::{fetch_page, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};
use crate::repository::attribute::AttributeRepository;
use crate::repository::inventory::ensure_inventory;

const LIST: ListSpec = ListSpec {
    table: "product_variants",
    columns: "*",
    search: &["sku", "name"],
    status: None,
    sku: Some(Clause::eq("sku = ")),
    category: Some(Clause {
        open: "product_id IN (SELECT id FROM products WHERE category_id = ",
        close: ")",
    }),
    order_by: "sku",
};

/// Repository for variant database operations.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<ProductVariant>> {
        let variant =
            sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE sku = ?1")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?;

        Ok(variant)
    }

    /// All variants of a product, by SKU.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<ProductVariant>> {
        variants_of(&self.pool, product_id).await
    }

    /// Typed attributes of a variant.
    pub async fn attributes(&self, variant_id: &str) -> DbResult<AttributeMap> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT attribute_code, value
            FROM variant_attributes
            WHERE variant_id = ?1
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(code, value)| -> DbResult<(String, AttributeValue)> {
                Ok((code, serde_json::from_str(&value)?))
            })
            .collect()
    }

    /// Replaces a variant's attributes after validating them against the
    /// stored attribute definitions.
    pub async fn set_attributes(&self, variant_id: &str, attributes: &AttributeMap) -> DbResult<()> {
        let registry = AttributeRepository::new(self.pool.clone()).registry().await?;
        registry.validate(attributes)?;

        debug!(variant_id = %variant_id, count = attributes.len(), "Setting variant attributes");

        let mut tx = self.pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM product_variants WHERE id = ?1")
                .bind(variant_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DbError::not_found(Self::ENTITY, variant_id));
        }

        sqlx::query("DELETE FROM variant_attributes WHERE variant_id = ?1")
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;

        for (code, value) in attributes {
            sqlx::query(
                r#"
                INSERT INTO variant_attributes (variant_id, attribute_code, value)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(variant_id)
            .bind(code)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Field checks shared by the variant admin and product inline editing.
pub(crate) fn validate_variant(variant: &ProductVariant) -> DbResult<()> {
    validate_sku(&variant.sku)?;
    validate_name("name", &variant.name)?;
    if let Some(price) = variant.price_cents {
        validate_amount_cents("price_cents", price)?;
    }
    if let Some(price) = variant.compare_at_price_cents {
        validate_amount_cents("compare_at_price_cents", price)?;
    }
    if let Some(weight) = variant.weight_grams {
        if weight < 0 {
            return Err(ValidationError::OutOfRange {
                field: "weight_grams".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
    }
    Ok(())
}

pub(crate) async fn variants_of(
    pool: &SqlitePool,
    product_id: &str,
) -> DbResult<Vec<ProductVariant>> {
    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = ?1 ORDER BY sku",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(variants)
}

/// Inserts or overwrites a variant by id, and makes sure it has an
/// inventory row.
pub(crate) async fn upsert_variant(
    conn: &mut SqliteConnection,
    variant: &ProductVariant,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO product_variants (
            id, product_id, sku, name,
            price_cents, compare_at_price_cents, weight_grams,
            is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            product_id = excluded.product_id,
            sku = excluded.sku,
            name = excluded.name,
            price_cents = excluded.price_cents,
            compare_at_price_cents = excluded.compare_at_price_cents,
            weight_grams = excluded.weight_grams,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&variant.id)
    .bind(&variant.product_id)
    .bind(&variant.sku)
    .bind(&variant.name)
    .bind(variant.price_cents)
    .bind(variant.compare_at_price_cents)
    .bind(variant.weight_grams)
    .bind(variant.is_active)
    .bind(variant.created_at)
    .bind(variant.updated_at)
    .execute(&mut *conn)
    .await?;

    ensure_inventory(conn, &variant.id).await
}

impl AdminResource for VariantRepository {
    type Record = ProductVariant;
    const ENTITY: &'static str = "ProductVariant";

    async fn list(&self, params: &ListParams) -> DbResult<Page<ProductVariant>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<ProductVariant>> {
        let variant =
            sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(variant)
    }

    /// Inserts the variant together with an empty inventory row.
    async fn create(&self, variant: &ProductVariant) -> DbResult<ProductVariant> {
        validate_variant(variant)?;
        debug!(sku = %variant.sku, product_id = %variant.product_id, "Inserting variant");

        let existing = self.get(&variant.id).await?;
        if existing.is_some() {
            return Err(DbError::duplicate("product_variants.id", &variant.id));
        }

        let mut tx = self.pool.begin().await?;
        upsert_variant(&mut tx, variant).await?;
        tx.commit().await?;

        Ok(variant.clone())
    }

    async fn update(&self, variant: &ProductVariant) -> DbResult<ProductVariant> {
        validate_variant(variant)?;
        debug!(id = %variant.id, "Updating variant");

        let mut updated = variant.clone();
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE product_variants SET
                product_id = ?2,
                sku = ?3,
                name = ?4,
                price_cents = ?5,
                compare_at_price_cents = ?6,
                weight_grams = ?7,
                is_active = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(&updated.product_id)
        .bind(&updated.sku)
        .bind(&updated.name)
        .bind(updated.price_cents)
        .bind(updated.compare_at_price_cents)
        .bind(updated.weight_grams)
        .bind(updated.is_active)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &variant.id));
        }

        Ok(updated)
    }

    /// Deletes the variant, its inventory and attributes. Order items keep
    /// their snapshots with `variant_id` cleared.
    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting variant");

        let result = sqlx::query("DELETE FROM product_variants WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{seed_product, test_db, variant};
    use shopkit_core::{AttributeDefinition, AttributeKind, CoreError};

    #[tokio::test]
    async fn test_create_variant_creates_inventory() {
        let db = test_db().await;
        let product = seed_product(&db, "Classic Tee", 1999).await;

        let v = db
            .variants()
            .create(&variant(&product.id, "TEE-M", None))
            .await
            .unwrap();

        let inventory = db.inventory().get_by_variant(&v.id).await.unwrap().unwrap();
        assert_eq!(inventory.on_hand, 0);
        assert_eq!(inventory.reserved, 0);

        assert_eq!(db.variants().for_product(&product.id).await.unwrap().len(), 1);
        assert_eq!(db.variants().get_by_sku("TEE-M").await.unwrap().unwrap().id, v.id);
    }

    #[tokio::test]
    async fn test_duplicate_sku() {
        let db = test_db().await;
        let product = seed_product(&db, "Classic Tee", 1999).await;

        db.variants()
            .create(&variant(&product.id, "TEE-M", None))
            .await
            .unwrap();
        let err = db
            .variants()
            .create(&variant(&product.id, "TEE-M", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { field, .. } if field == "product_variants.sku"));
    }

    #[tokio::test]
    async fn test_invalid_sku_rejected() {
        let db = test_db().await;
        let product = seed_product(&db, "Classic Tee", 1999).await;

        let err = db
            .variants()
            .create(&variant(&product.id, "TEE M!", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_typed_attributes() {
        let db = test_db().await;
        let product = seed_product(&db, "Classic Tee", 1999).await;
        let v = db
            .variants()
            .create(&variant(&product.id, "TEE-RED-M", None))
            .await
            .unwrap();

        db.attributes()
            .create(&AttributeDefinition::choice("color", "Color", ["red", "blue"]))
            .await
            .unwrap();
        db.attributes()
            .create(&AttributeDefinition::new("cotton_pct", "Cotton %", AttributeKind::Decimal))
            .await
            .unwrap();

        let mut attrs = AttributeMap::new();
        attrs.insert("color".into(), AttributeValue::Choice("red".into()));
        attrs.insert("cotton_pct".into(), AttributeValue::Decimal(9500));
        db.variants().set_attributes(&v.id, &attrs).await.unwrap();

        assert_eq!(db.variants().attributes(&v.id).await.unwrap(), attrs);

        // Unknown code and bad choice are rejected; stored values untouched
        let mut bad = AttributeMap::new();
        bad.insert("color".into(), AttributeValue::Choice("green".into()));
        assert!(matches!(
            db.variants().set_attributes(&v.id, &bad).await,
            Err(DbError::Domain(CoreError::InvalidAttribute { .. }))
        ));

        let mut unknown = AttributeMap::new();
        unknown.insert("glitter".into(), AttributeValue::Boolean(true));
        assert!(db.variants().set_attributes(&v.id, &unknown).await.is_err());

        assert_eq!(db.variants().attributes(&v.id).await.unwrap(), attrs);
    }

    #[tokio::test]
    async fn test_list_by_sku_search() {
        let db = test_db().await;
        let product = seed_product(&db, "Classic Tee", 1999).await;
        for sku in ["TEE-S", "TEE-M", "CAP-1"] {
            db.variants()
                .create(&variant(&product.id, sku, None))
                .await
                .unwrap();
        }

        let page = db.variants().list(&ListParams::new().search("tee")).await.unwrap();
        assert_eq!(page.total, 2);

        let page = db.variants().list(&ListParams::new().sku("CAP-1")).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }
}

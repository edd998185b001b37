//! # Attribute Repository
//!
//! Stored attribute definitions, keyed by `code`. Variants reference them
//! from `variant_attributes`; a definition in use cannot be deleted and its
//! kind cannot change.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use shopkit_core::{AttributeDefinition, AttributeKind, AttributeRegistry, CoreError};

use crate::admin::{fetch_page, AdminResource, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};

const LIST: ListSpec = ListSpec {
    table: "attribute_definitions",
    columns: "*",
    search: &["code", "name"],
    status: None,
    sku: None,
    category: None,
    order_by: "code",
};

/// `attribute_definitions` row; `options` is a JSON array.
#[derive(Debug, FromRow)]
struct AttributeRow {
    code: String,
    name: String,
    kind: AttributeKind,
    options: String,
}

impl TryFrom<AttributeRow> for AttributeDefinition {
    type Error = DbError;

    fn try_from(row: AttributeRow) -> DbResult<Self> {
        Ok(AttributeDefinition {
            code: row.code,
            name: row.name,
            kind: row.kind,
            options: serde_json::from_str(&row.options)?,
        })
    }
}

/// Repository for attribute definitions.
#[derive(Debug, Clone)]
pub struct AttributeRepository {
    pool: SqlitePool,
}

impl AttributeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AttributeRepository { pool }
    }

    /// All definitions.
    pub async fn all(&self) -> DbResult<Vec<AttributeDefinition>> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            "SELECT * FROM attribute_definitions ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttributeDefinition::try_from).collect()
    }

    /// Loads every definition into a registry for validating variant attributes.
    pub async fn registry(&self) -> DbResult<AttributeRegistry> {
        Ok(self.all().await?.into_iter().collect())
    }

    /// Number of variant attribute values using `code`.
    pub async fn usage_count(&self, code: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM variant_attributes WHERE attribute_code = ?1")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

impl AdminResource for AttributeRepository {
    type Record = AttributeDefinition;
    const ENTITY: &'static str = "AttributeDefinition";

    async fn list(&self, params: &ListParams) -> DbResult<Page<AttributeDefinition>> {
        let page: Page<AttributeRow> = fetch_page(&self.pool, &LIST, params).await?;
        page.try_map(AttributeDefinition::try_from)
    }

    /// Looks a definition up by its code.
    async fn get(&self, code: &str) -> DbResult<Option<AttributeDefinition>> {
        let row = sqlx::query_as::<_, AttributeRow>(
            "SELECT * FROM attribute_definitions WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttributeDefinition::try_from).transpose()
    }

    async fn create(&self, definition: &AttributeDefinition) -> DbResult<AttributeDefinition> {
        definition.validate()?;
        debug!(code = %definition.code, kind = %definition.kind, "Inserting attribute definition");

        sqlx::query(
            r#"
            INSERT INTO attribute_definitions (code, name, kind, options)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&definition.code)
        .bind(&definition.name)
        .bind(definition.kind)
        .bind(serde_json::to_string(&definition.options)?)
        .execute(&self.pool)
        .await?;

        Ok(definition.clone())
    }

    async fn update(&self, definition: &AttributeDefinition) -> DbResult<AttributeDefinition> {
        definition.validate()?;
        debug!(code = %definition.code, "Updating attribute definition");

        let current = self
            .get(&definition.code)
            .await?
            .ok_or_else(|| DbError::not_found(Self::ENTITY, &definition.code))?;

        if current.kind != definition.kind && self.usage_count(&definition.code).await? > 0 {
            return Err(CoreError::InvalidAttribute {
                code: definition.code.clone(),
                reason: format!(
                    "kind cannot change from {} to {} while variants use it",
                    current.kind, definition.kind
                ),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE attribute_definitions SET
                name = ?2,
                kind = ?3,
                options = ?4
            WHERE code = ?1
            "#,
        )
        .bind(&definition.code)
        .bind(&definition.name)
        .bind(definition.kind)
        .bind(serde_json::to_string(&definition.options)?)
        .execute(&self.pool)
        .await?;

        Ok(definition.clone())
    }

    /// Fails with `ForeignKeyViolation` while variants still use the code.
    async fn delete(&self, code: &str) -> DbResult<()> {
        debug!(code = %code, "Deleting attribute definition");

        let result = sqlx::query("DELETE FROM attribute_definitions WHERE code = ?1")
            .bind(code)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, code));
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
    use shopkit_core::{AttributeMap, AttributeValue};

    #[tokio::test]
    async fn test_definition_round_trip() {
        let db = test_db().await;
        let repo = db.attributes();

        let size = AttributeDefinition::choice("size", "Size", ["S", "M", "L"]);
        repo.create(&size).await.unwrap();
        assert_eq!(repo.get("size").await.unwrap(), Some(size));

        let registry = repo.registry().await.unwrap();
        assert_eq!(registry.len(), 1);

        let page = repo.list(&ListParams::new().search("siz")).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected() {
        let db = test_db().await;
        let err = db
            .attributes()
            .create(&AttributeDefinition::new("color", "Color", AttributeKind::Choice))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_definition_in_use() {
        let db = test_db().await;
        let repo = db.attributes();
        repo.create(&AttributeDefinition::new("material", "Material", AttributeKind::Text))
            .await
            .unwrap();

        let product = seed_product(&db, "Scarf", 2500).await;
        let v = db
            .variants()
            .create(&variant(&product.id, "SCARF-1", None))
            .await
            .unwrap();
        let mut attrs = AttributeMap::new();
        attrs.insert("material".into(), AttributeValue::Text("wool".into()));
        db.variants().set_attributes(&v.id, &attrs).await.unwrap();

        assert_eq!(repo.usage_count("material").await.unwrap(), 1);

        // Renaming is fine, changing the kind is not
        let mut renamed = AttributeDefinition::new("material", "Fabric", AttributeKind::Text);
        repo.update(&renamed).await.unwrap();
        renamed.kind = AttributeKind::Integer;
        assert!(matches!(
            repo.update(&renamed).await,
            Err(DbError::Domain(CoreError::InvalidAttribute { .. }))
        ));

        assert!(matches!(
            repo.delete("material").await,
            Err(DbError::ForeignKeyViolation { .. })
        ));
    }
}

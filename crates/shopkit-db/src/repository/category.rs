//! # Category Repository
//!
//! Catalog categories, optionally nested one level or more via `parent_id`.
//! Deleting a category detaches its products and children (SET NULL).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use shopkit_core::validation::{validate_name, validate_slug};
use shopkit_core::{Category, ValidationError};

use crate::admin::{fetch_page, AdminResource, Clause, ListParams, ListSpec, Page};
use crate::error::{DbError, DbResult};

const LIST: ListSpec = ListSpec {
    table: "categories",
    columns: "*",
    search: &["name", "slug"],
    status: None,
    sku: None,
    // Lists the children of a category
    category: Some(Clause::eq("parent_id = ")),
    order_by: "name",
};

/// Repository for category database operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    pub async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    /// Active top-level categories, by name.
    pub async fn roots(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE parent_id IS NULL AND is_active = 1
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Direct children of `parent_id`, by name.
    pub async fn children(&self, parent_id: &str) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE parent_id = ?1 ORDER BY name",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    fn validate(category: &Category) -> DbResult<()> {
        validate_name("name", &category.name)?;
        validate_slug(&category.slug)?;
        if category.parent_id.as_deref() == Some(category.id.as_str()) {
            return Err(ValidationError::InvalidFormat {
                field: "parent_id".to_string(),
                reason: "a category cannot be its own parent".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl AdminResource for CategoryRepository {
    type Record = Category;
    const ENTITY: &'static str = "Category";

    async fn list(&self, params: &ListParams) -> DbResult<Page<Category>> {
        fetch_page(&self.pool, &LIST, params).await
    }

    async fn get(&self, id: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    async fn create(&self, category: &Category) -> DbResult<Category> {
        Self::validate(category)?;
        debug!(slug = %category.slug, "Inserting category");

        sqlx::query(
            r#"
            INSERT INTO categories (
                id, name, slug, parent_id, description, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.parent_id)
        .bind(&category.description)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(category.clone())
    }

    async fn update(&self, category: &Category) -> DbResult<Category> {
        Self::validate(category)?;
        debug!(id = %category.id, "Updating category");

        let mut updated = category.clone();
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE categories SET
                name = ?2,
                slug = ?3,
                parent_id = ?4,
                description = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(&updated.name)
        .bind(&updated.slug)
        .bind(&updated.parent_id)
        .bind(&updated.description)
        .bind(updated.is_active)
        .bind(updated.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(Self::ENTITY, &category.id));
        }

        Ok(updated)
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting category");

        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
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
    use crate::repository::test_support::{category, test_db};

    #[tokio::test]
    async fn test_category_crud() {
        let db = test_db().await;
        let repo = db.categories();

        let apparel = repo.create(&category("Apparel", None)).await.unwrap();
        let tees = repo
            .create(&category("T-Shirts", Some(&apparel.id)))
            .await
            .unwrap();

        assert_eq!(repo.get_by_slug("t-shirts").await.unwrap().unwrap().id, tees.id);
        assert_eq!(repo.roots().await.unwrap().len(), 1);
        assert_eq!(repo.children(&apparel.id).await.unwrap().len(), 1);

        let mut renamed = tees.clone();
        renamed.name = "Tees".into();
        let renamed = repo.update(&renamed).await.unwrap();
        assert_eq!(repo.get(&tees.id).await.unwrap().unwrap().name, "Tees");
        assert!(renamed.updated_at >= tees.updated_at);

        // Children are detached, not deleted
        repo.delete(&apparel.id).await.unwrap();
        let orphan = repo.get(&tees.id).await.unwrap().unwrap();
        assert_eq!(orphan.parent_id, None);

        assert!(matches!(
            repo.delete(&apparel.id).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug() {
        let db = test_db().await;
        let repo = db.categories();

        repo.create(&category("Apparel", None)).await.unwrap();
        let err = repo.create(&category("Apparel", None)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { field, .. } if field == "categories.slug"));
    }

    #[tokio::test]
    async fn test_self_parent_rejected() {
        let db = test_db().await;
        let mut c = category("Loop", None);
        c.parent_id = Some(c.id.clone());
        assert!(matches!(
            db.categories().create(&c).await,
            Err(DbError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_parent_and_search() {
        let db = test_db().await;
        let repo = db.categories();

        let apparel = repo.create(&category("Apparel", None)).await.unwrap();
        repo.create(&category("T-Shirts", Some(&apparel.id))).await.unwrap();
        repo.create(&category("Hoodies", Some(&apparel.id))).await.unwrap();
        repo.create(&category("Mugs", None)).await.unwrap();

        let page = repo
            .list(&ListParams::new().category_id(&apparel.id))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].name, "Hoodies");

        let page = repo.list(&ListParams::new().search("mug")).await.unwrap();
        assert_eq!(page.total, 1);
    }
}

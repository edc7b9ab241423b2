use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{StorageError, StorageResult};
use super::types::slugify;

/// Post category
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

/// Category store trait
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// List all categories with their post counts
    async fn list_categories(&self) -> StorageResult<Vec<(Category, i64)>>;

    /// Create a category; the slug is derived from the name
    async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Category>;

    /// Get a category by slug
    async fn get_category_by_slug(&self, slug: &str) -> StorageResult<Category>;

    /// Resolve a list of category slugs to ids, ignoring unknown ones
    async fn resolve_slugs(&self, slugs: &[String]) -> StorageResult<Vec<Uuid>>;

    /// Delete a category (links to posts cascade)
    async fn delete_category(&self, id: Uuid) -> StorageResult<()>;
}

/// PostgreSQL implementation of CategoryStore
pub struct PostgresCategoryStore {
    pool: PgPool,
}

impl PostgresCategoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for categories
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(100) UNIQUE NOT NULL,
                slug VARCHAR(100) UNIQUE NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_category(row: &sqlx::postgres::PgRow) -> StorageResult<Category> {
        Ok(Category {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
        })
    }
}

#[async_trait]
impl CategoryStore for PostgresCategoryStore {
    async fn list_categories(&self) -> StorageResult<Vec<(Category, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.slug, c.description,
                   (SELECT COUNT(*) FROM post_categories pc WHERE pc.category_id = c.id) AS post_count
            FROM categories c
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let category = Self::row_to_category(row)?;
                let post_count: i64 = row.try_get("post_count")?;
                Ok((category, post_count))
            })
            .collect()
    }

    async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<Category> {
        let slug = slugify(name);

        let taken = sqlx::query("SELECT 1 FROM categories WHERE name = $1 OR slug = $2")
            .bind(name)
            .bind(&slug)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if taken {
            return Err(StorageError::DuplicateCategory(name.to_string()));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, slug, description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(&slug)
        .bind(description)
        .execute(&self.pool)
        .await?;

        Ok(Category {
            id,
            name: name.to_string(),
            slug,
            description: description.map(|s| s.to_string()),
        })
    }

    async fn get_category_by_slug(&self, slug: &str) -> StorageResult<Category> {
        let row = sqlx::query("SELECT id, name, slug, description FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::CategoryNotFound(slug.to_string()))?;

        Self::row_to_category(&row)
    }

    async fn resolve_slugs(&self, slugs: &[String]) -> StorageResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if let Some(row) = sqlx::query("SELECT id FROM categories WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?
            {
                ids.push(row.try_get("id")?);
            }
        }
        Ok(ids)
    }

    async fn delete_category(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::CategoryNotFound(id.to_string()));
        }
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::categories::Category;
use super::traits::{StorageError, StorageResult};
use super::types::{make_excerpt, slugify, PostStatus};

/// Blog post with author and taxonomy details joined in
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub author_id: Uuid,
    pub author_username: String,
    pub status: PostStatus,
    pub allow_comments: bool,
    pub view_count: i64,
    pub like_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

/// Free-form label on a post; created on first use, shared across posts
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Post creation request
#[derive(Debug)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub author_id: Uuid,
    pub status: PostStatus,
    pub allow_comments: bool,
    pub category_ids: Vec<Uuid>,
    pub tags: Vec<String>,
}

/// Fields that can change on update; None leaves the column untouched
#[derive(Debug, Default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image: Option<Option<String>>,
    pub status: Option<PostStatus>,
    pub allow_comments: Option<bool>,
    pub category_ids: Option<Vec<Uuid>>,
    pub tags: Option<Vec<String>>,
}

/// Sort order for post listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostSort {
    #[default]
    Newest,
    Oldest,
    Popular,
}

/// Filters for post listings
#[derive(Debug, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub search: Option<String>,
    pub author_username: Option<String>,
    pub sort: PostSort,
}

/// Post store trait
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Create a post; the slug is derived from the title and de-duplicated
    async fn create_post(&self, post: NewPost) -> StorageResult<Post>;

    /// Get post by ID
    async fn get_post(&self, id: Uuid) -> StorageResult<Post>;

    /// Get post by slug
    async fn get_post_by_slug(&self, slug: &str) -> StorageResult<Post>;

    /// Apply a partial update
    async fn update_post(&self, id: Uuid, update: UpdatePost) -> StorageResult<Post>;

    /// Delete a post and its comments/likes (cascade)
    async fn delete_post(&self, id: Uuid) -> StorageResult<()>;

    /// List posts matching the filter; returns the page and the total match count
    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: u32,
        per_page: u32,
    ) -> StorageResult<(Vec<Post>, i64)>;

    /// Toggle a like; returns (now_liked, like_count)
    async fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> StorageResult<(bool, i64)>;

    /// Bump the view counter
    async fn increment_views(&self, id: Uuid) -> StorageResult<()>;
}

/// PostgreSQL implementation of PostStore
pub struct PostgresPostStore {
    pool: PgPool,
}

const POST_COLUMNS: &str = r#"
    p.id, p.title, p.slug, p.content, p.excerpt, p.featured_image,
    p.author_id, u.username AS author_username, p.status, p.allow_comments,
    p.view_count, p.published_at, p.created_at, p.updated_at,
    (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count
"#;

impl PostgresPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for posts, categories links and likes
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) UNIQUE NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT NOT NULL DEFAULT '',
                featured_image VARCHAR(255),
                author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                allow_comments BOOLEAN NOT NULL DEFAULT TRUE,
                view_count BIGINT NOT NULL DEFAULT 0,
                published_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_categories (
                post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                category_id UUID NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, category_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(50) NOT NULL,
                slug VARCHAR(50) UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                tag_id UUID NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, tag_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_likes (
                post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (post_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_status_published
            ON posts(status, published_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_post(row: &sqlx::postgres::PgRow) -> StorageResult<Post> {
        let status_str: String = row.try_get("status")?;
        let status = PostStatus::parse(&status_str)
            .ok_or_else(|| StorageError::Internal(format!("unknown post status: {}", status_str)))?;

        Ok(Post {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            content: row.try_get("content")?,
            excerpt: row.try_get("excerpt")?,
            featured_image: row.try_get("featured_image")?,
            author_id: row.try_get("author_id")?,
            author_username: row.try_get("author_username")?,
            status,
            allow_comments: row.try_get("allow_comments")?,
            view_count: row.try_get("view_count")?,
            like_count: row.try_get("like_count")?,
            published_at: row.try_get("published_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            categories: Vec::new(),
            tags: Vec::new(),
        })
    }

    /// Pick a slug that is not yet taken, appending -2, -3, ... as needed
    async fn unique_slug(&self, title: &str) -> StorageResult<String> {
        let base = slugify(title);
        let mut candidate = base.clone();
        let mut counter = 2;
        loop {
            let taken = sqlx::query("SELECT 1 FROM posts WHERE slug = $1")
                .bind(&candidate)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, counter);
            counter += 1;
        }
    }

    async fn load_categories(&self, post_id: Uuid) -> StorageResult<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.slug, c.description
            FROM categories c
            JOIN post_categories pc ON pc.category_id = c.id
            WHERE pc.post_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    slug: row.try_get("slug")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn load_tags(&self, post_id: Uuid) -> StorageResult<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.slug
            FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Tag {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    slug: row.try_get("slug")?,
                })
            })
            .collect()
    }

    /// Replace a post's tags; unknown tag names are created on the fly
    async fn set_tags(&self, post_id: Uuid, names: &[String]) -> StorageResult<()> {
        let tags = normalize_tag_names(names);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        for (name, slug) in &tags {
            let tag_id: Uuid = sqlx::query(
                r#"
                INSERT INTO tags (id, name, slug) VALUES ($1, $2, $3)
                ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(slug)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

            sqlx::query(
                r#"
                INSERT INTO post_tags (post_id, tag_id)
                VALUES ($1, $2) ON CONFLICT DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_categories(&self, post_id: Uuid, category_ids: &[Uuid]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                r#"
                INSERT INTO post_categories (post_id, category_id)
                VALUES ($1, $2) ON CONFLICT DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        builder.push(" WHERE 1=1");

        if let Some(status) = filter.status {
            builder.push(" AND p.status = ").push_bind(status.as_str());
        }
        if let Some(search) = filter.search.as_ref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (p.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.content ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = filter.category_slug.as_ref().filter(|s| !s.is_empty()) {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM post_categories pc \
                     JOIN categories c ON pc.category_id = c.id \
                     WHERE pc.post_id = p.id AND c.slug = ",
                )
                .push_bind(category.clone())
                .push(")");
        }
        if let Some(tag) = filter.tag_slug.as_ref().filter(|s| !s.is_empty()) {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM post_tags pt \
                     JOIN tags t ON pt.tag_id = t.id \
                     WHERE pt.post_id = p.id AND t.slug = ",
                )
                .push_bind(tag.clone())
                .push(")");
        }
        if let Some(author) = filter.author_username.as_ref().filter(|s| !s.is_empty()) {
            builder.push(" AND u.username = ").push_bind(author.clone());
        }
    }
}

/// Trim tag names, drop empties, and de-duplicate by slug keeping the
/// first spelling; returns (name, slug) pairs
fn normalize_tag_names(names: &[String]) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let slug = slugify(name);
        if seen.insert(slug.clone()) {
            tags.push((name.to_string(), slug));
        }
    }
    tags
}

#[async_trait]
impl PostStore for PostgresPostStore {
    async fn create_post(&self, post: NewPost) -> StorageResult<Post> {
        let id = Uuid::new_v4();
        let slug = self.unique_slug(&post.title).await?;
        let excerpt = post
            .excerpt
            .unwrap_or_else(|| make_excerpt(&post.content, 200));
        let now = Utc::now();
        let published_at = (post.status == PostStatus::Published).then_some(now);

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, title, slug, content, excerpt, featured_image, author_id,
                 status, allow_comments, published_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(id)
        .bind(&post.title)
        .bind(&slug)
        .bind(&post.content)
        .bind(&excerpt)
        .bind(&post.featured_image)
        .bind(post.author_id)
        .bind(post.status.as_str())
        .bind(post.allow_comments)
        .bind(published_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if !post.category_ids.is_empty() {
            self.set_categories(id, &post.category_ids).await?;
        }
        if !post.tags.is_empty() {
            self.set_tags(id, &post.tags).await?;
        }

        self.get_post(id).await
    }

    async fn get_post(&self, id: Uuid) -> StorageResult<Post> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON p.author_id = u.id WHERE p.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::PostNotFound(id.to_string()))?;

        let mut post = Self::row_to_post(&row)?;
        post.categories = self.load_categories(post.id).await?;
        post.tags = self.load_tags(post.id).await?;
        Ok(post)
    }

    async fn get_post_by_slug(&self, slug: &str) -> StorageResult<Post> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON p.author_id = u.id WHERE p.slug = $1"
        );
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::PostNotFound(slug.to_string()))?;

        let mut post = Self::row_to_post(&row)?;
        post.categories = self.load_categories(post.id).await?;
        post.tags = self.load_tags(post.id).await?;
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, update: UpdatePost) -> StorageResult<Post> {
        let current = self.get_post(id).await?;

        let title = update.title.unwrap_or(current.title);
        let content = update.content.unwrap_or(current.content);
        let excerpt = update.excerpt.unwrap_or(current.excerpt);
        let featured_image = update.featured_image.unwrap_or(current.featured_image);
        let status = update.status.unwrap_or(current.status);
        let allow_comments = update.allow_comments.unwrap_or(current.allow_comments);

        // First transition to published stamps published_at
        let published_at = match (current.published_at, status) {
            (None, PostStatus::Published) => Some(Utc::now()),
            (existing, _) => existing,
        };

        sqlx::query(
            r#"
            UPDATE posts
            SET title = $1, content = $2, excerpt = $3, featured_image = $4,
                status = $5, allow_comments = $6, published_at = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(&title)
        .bind(&content)
        .bind(&excerpt)
        .bind(&featured_image)
        .bind(status.as_str())
        .bind(allow_comments)
        .bind(published_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if let Some(category_ids) = update.category_ids {
            self.set_categories(id, &category_ids).await?;
        }
        if let Some(tags) = update.tags {
            self.set_tags(id, &tags).await?;
        }

        self.get_post(id).await
    }

    async fn delete_post(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::PostNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: u32,
        per_page: u32,
    ) -> StorageResult<(Vec<Post>, i64)> {
        let offset = (page.saturating_sub(1) as i64) * per_page as i64;

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) AS total FROM posts p JOIN users u ON p.author_id = u.id",
        );
        Self::push_filter(&mut count_builder, filter);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON p.author_id = u.id"
        ));
        Self::push_filter(&mut builder, filter);
        builder.push(match filter.sort {
            PostSort::Newest => " ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC",
            PostSort::Oldest => " ORDER BY p.published_at ASC NULLS LAST, p.created_at ASC",
            PostSort::Popular => " ORDER BY p.view_count DESC, like_count DESC",
        });
        builder.push(" LIMIT ").push_bind(per_page as i64);
        builder.push(" OFFSET ").push_bind(offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut post = Self::row_to_post(row)?;
            post.categories = self.load_categories(post.id).await?;
            post.tags = self.load_tags(post.id).await?;
            posts.push(post);
        }

        Ok((posts, total))
    }

    async fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> StorageResult<(bool, i64)> {
        // Make sure the post exists so a like cannot dangle
        let exists = sqlx::query("SELECT 1 FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if !exists {
            return Err(StorageError::PostNotFound(post_id.to_string()));
        }

        let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let liked = if deleted == 0 {
            sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
                .bind(post_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            true
        } else {
            false
        };

        let like_count: i64 = sqlx::query("SELECT COUNT(*) AS total FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        Ok((liked, like_count))
    }

    async fn increment_views(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tags_slugifies_names() {
        let tags = normalize_tag_names(&names(&["Rust Programming", "Web Dev"]));
        assert_eq!(
            tags,
            vec![
                ("Rust Programming".to_string(), "rust-programming".to_string()),
                ("Web Dev".to_string(), "web-dev".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_tags_drops_blank_names() {
        let tags = normalize_tag_names(&names(&["", "   ", "rust"]));
        assert_eq!(tags, vec![("rust".to_string(), "rust".to_string())]);
    }

    #[test]
    fn test_normalize_tags_dedupes_by_slug_keeping_first_spelling() {
        let tags = normalize_tag_names(&names(&["Rust", "rust", "RUST!", "tokio"]));
        assert_eq!(
            tags,
            vec![
                ("Rust".to_string(), "rust".to_string()),
                ("tokio".to_string(), "tokio".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_tags_trims_whitespace() {
        let tags = normalize_tag_names(&names(&["  async io  "]));
        assert_eq!(tags, vec![("async io".to_string(), "async-io".to_string())]);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{StorageError, StorageResult};
use super::types::CommentStatus;

/// Comment on a post, by a registered user or a guest
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// Username of the registered author, joined from users
    pub username: Option<String>,
    /// Display name supplied by guest commenters
    pub author_name: Option<String>,
    #[serde(skip_serializing)]
    pub author_email: Option<String>,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

/// Comment creation request
#[derive(Debug)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub content: String,
    pub status: CommentStatus,
}

/// Comment store trait
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Create a comment
    async fn create_comment(&self, comment: NewComment) -> StorageResult<Comment>;

    /// Get comment by ID
    async fn get_comment(&self, id: Uuid) -> StorageResult<Comment>;

    /// List approved comments for a post, oldest first
    async fn list_for_post(
        &self,
        post_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> StorageResult<(Vec<Comment>, i64)>;

    /// Replace a comment's content
    async fn update_content(&self, id: Uuid, content: &str) -> StorageResult<Comment>;

    /// Change moderation status
    async fn set_status(&self, id: Uuid, status: CommentStatus) -> StorageResult<Comment>;

    /// Delete a comment (replies cascade)
    async fn delete_comment(&self, id: Uuid) -> StorageResult<()>;
}

/// PostgreSQL implementation of CommentStore
pub struct PostgresCommentStore {
    pool: PgPool,
}

const COMMENT_COLUMNS: &str = r#"
    c.id, c.post_id, c.parent_id, c.user_id, u.username,
    c.author_name, c.author_email, c.content, c.status, c.created_at
"#;

impl PostgresCommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for comments
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id UUID REFERENCES comments(id) ON DELETE CASCADE,
                user_id UUID REFERENCES users(id) ON DELETE SET NULL,
                author_name VARCHAR(100),
                author_email VARCHAR(255),
                content TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_comments_post_status
            ON comments(post_id, status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_comment(row: &sqlx::postgres::PgRow) -> StorageResult<Comment> {
        let status_str: String = row.try_get("status")?;
        let status = CommentStatus::parse(&status_str).ok_or_else(|| {
            StorageError::Internal(format!("unknown comment status: {}", status_str))
        })?;

        Ok(Comment {
            id: row.try_get("id")?,
            post_id: row.try_get("post_id")?,
            parent_id: row.try_get("parent_id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            author_name: row.try_get("author_name")?,
            author_email: row.try_get("author_email")?,
            content: row.try_get("content")?,
            status,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl CommentStore for PostgresCommentStore {
    async fn create_comment(&self, comment: NewComment) -> StorageResult<Comment> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO comments
                (id, post_id, parent_id, user_id, author_name, author_email, content, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.user_id)
        .bind(&comment.author_name)
        .bind(&comment.author_email)
        .bind(&comment.content)
        .bind(comment.status.as_str())
        .execute(&self.pool)
        .await?;

        self.get_comment(id).await
    }

    async fn get_comment(&self, id: Uuid) -> StorageResult<Comment> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             LEFT JOIN users u ON c.user_id = u.id WHERE c.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::CommentNotFound(id))?;

        Self::row_to_comment(&row)
    }

    async fn list_for_post(
        &self,
        post_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> StorageResult<(Vec<Comment>, i64)> {
        let offset = (page.saturating_sub(1) as i64) * per_page as i64;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM comments WHERE post_id = $1 AND status = 'approved'",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c \
             LEFT JOIN users u ON c.user_id = u.id \
             WHERE c.post_id = $1 AND c.status = 'approved' \
             ORDER BY c.created_at ASC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(post_id)
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let comments = rows
            .iter()
            .map(Self::row_to_comment)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok((comments, total))
    }

    async fn update_content(&self, id: Uuid, content: &str) -> StorageResult<Comment> {
        let result = sqlx::query("UPDATE comments SET content = $1 WHERE id = $2")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::CommentNotFound(id));
        }
        self.get_comment(id).await
    }

    async fn set_status(&self, id: Uuid, status: CommentStatus) -> StorageResult<Comment> {
        let result = sqlx::query("UPDATE comments SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::CommentNotFound(id));
        }
        self.get_comment(id).await
    }

    async fn delete_comment(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::CommentNotFound(id));
        }
        Ok(())
    }
}

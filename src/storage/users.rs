use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{StorageError, StorageResult};
use super::types::Role;

/// User account in the system
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// User creation request
#[derive(Debug)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    /// Token the user must present to verify their email address.
    /// None marks the account verified immediately (CLI-created users).
    pub verification_token: Option<String>,
}

/// User store trait
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a new user
    async fn create_user(&self, user: CreateUser) -> StorageResult<User>;

    /// Get user by ID
    async fn get_user(&self, id: Uuid) -> StorageResult<User>;

    /// Get user by username
    async fn get_user_by_username(&self, username: &str) -> StorageResult<User>;

    /// Get user by email
    async fn get_user_by_email(&self, email: &str) -> StorageResult<User>;

    /// Get user by email or username (login form accepts either)
    async fn get_user_by_login(&self, login: &str) -> StorageResult<User>;

    /// Check if a username is taken
    async fn username_exists(&self, username: &str) -> StorageResult<bool>;

    /// Mark the account matching this verification token as verified
    async fn verify_email(&self, token: &str) -> StorageResult<User>;

    /// List all users
    async fn list_users(&self) -> StorageResult<Vec<User>>;

    /// Update user's password
    async fn update_password(&self, id: Uuid, password_hash: &str) -> StorageResult<()>;

    /// Update user's active status
    async fn set_user_active(&self, id: Uuid, is_active: bool) -> StorageResult<()>;

    /// Update user's role
    async fn set_user_role(&self, id: Uuid, role: Role) -> StorageResult<()>;

    /// Update last login timestamp
    async fn update_last_login(&self, id: Uuid) -> StorageResult<()>;

    /// Delete user
    async fn delete_user(&self, id: Uuid) -> StorageResult<()>;
}

/// PostgreSQL implementation of UserStore
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for users
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                username VARCHAR(50) UNIQUE NOT NULL,
                email VARCHAR(255) UNIQUE NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(100),
                last_name VARCHAR(100),
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                is_verified BOOLEAN NOT NULL DEFAULT FALSE,
                verification_token VARCHAR(64),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_login TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> StorageResult<User> {
        let role_str: String = row.try_get("role")?;
        let role = Role::parse(&role_str)
            .ok_or_else(|| StorageError::Internal(format!("unknown role: {}", role_str)))?;

        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            role,
            is_verified: row.try_get("is_verified")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            last_login: row.try_get("last_login")?,
        })
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create_user(&self, user: CreateUser) -> StorageResult<User> {
        // Duplicate checks up front for friendly error messages
        if self.username_exists(&user.username).await? {
            return Err(StorageError::DuplicateUsername(user.username));
        }
        let email_taken = sqlx::query("SELECT 1 FROM users WHERE email = $1")
            .bind(&user.email)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if email_taken {
            return Err(StorageError::DuplicateEmail(user.email));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let is_verified = user.verification_token.is_none();

        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, email, password_hash, first_name, last_name,
                 role, is_verified, verification_token, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10)
            "#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(is_verified)
        .bind(&user.verification_token)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(id).await
    }

    async fn get_user(&self, id: Uuid) -> StorageResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::UserNotFound(id.to_string()))?;

        Self::row_to_user(&row)
    }

    async fn get_user_by_username(&self, username: &str) -> StorageResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))?;

        Self::row_to_user(&row)
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::UserNotFound(email.to_string()))?;

        Self::row_to_user(&row)
    }

    async fn get_user_by_login(&self, login: &str) -> StorageResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1 OR username = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::UserNotFound(login.to_string()))?;

        Self::row_to_user(&row)
    }

    async fn username_exists(&self, username: &str) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn verify_email(&self, token: &str) -> StorageResult<User> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE, verification_token = NULL
            WHERE verification_token = $1 AND is_verified = FALSE
            RETURNING id
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::InvalidVerificationToken)?;

        let id: Uuid = row.try_get("id")?;
        self.get_user(id).await
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_user).collect()
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = $1 WHERE id = $2")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

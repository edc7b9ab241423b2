use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{StorageError, StorageResult};

/// Security-relevant actions recorded in the audit trail
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    // Authentication
    LoginSuccess,
    LoginFailed,
    Logout,
    UserRegistered,
    EmailVerified,

    // Request gating
    RateLimited,
    CsrfRejected,

    // Moderation and administration
    CommentModerated,
    PostDeleted,
    UserCreated,
    UserSuspended,
    UserActivated,
    UserPasswordReset,
    UserDeleted,
}

impl SecurityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::UserRegistered => "user_registered",
            Self::EmailVerified => "email_verified",
            Self::RateLimited => "rate_limited",
            Self::CsrfRejected => "csrf_rejected",
            Self::CommentModerated => "comment_moderated",
            Self::PostDeleted => "post_deleted",
            Self::UserCreated => "user_created",
            Self::UserSuspended => "user_suspended",
            Self::UserActivated => "user_activated",
            Self::UserPasswordReset => "user_password_reset",
            Self::UserDeleted => "user_deleted",
        }
    }
}

/// One entry in the security event log
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: SecurityAction,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
}

impl SecurityEvent {
    pub fn new(action: SecurityAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            user_id: None,
            username: None,
            ip_address: None,
            details: None,
            success: true,
        }
    }

    pub fn user(mut self, id: Uuid, username: &str) -> Self {
        self.user_id = Some(id);
        self.username = Some(username.to_string());
        self
    }

    pub fn ip(mut self, ip: impl ToString) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failure(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Storage backend for the security event log
#[async_trait]
pub trait SecurityEventStore: Send + Sync {
    /// Append an event
    async fn log(&self, event: SecurityEvent) -> StorageResult<()>;

    /// Most recent events, newest first
    async fn recent(&self, limit: i64) -> StorageResult<Vec<SecurityEvent>>;

    /// Most recent events for one user, newest first
    async fn for_user(&self, username: &str, limit: i64) -> StorageResult<Vec<SecurityEvent>>;
}

/// PostgreSQL implementation of SecurityEventStore
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for security events
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS security_events (
                id UUID PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                action VARCHAR(50) NOT NULL,
                user_id UUID,
                username VARCHAR(50),
                ip_address VARCHAR(45),
                details JSONB,
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_security_events_timestamp
            ON security_events(timestamp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_event(row: &sqlx::postgres::PgRow) -> StorageResult<SecurityEvent> {
        let action_str: String = row.try_get("action")?;
        let action = serde_json::from_value(serde_json::Value::String(action_str.clone()))
            .map_err(|_| StorageError::Internal(format!("unknown action: {}", action_str)))?;

        Ok(SecurityEvent {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            action,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            ip_address: row.try_get("ip_address")?,
            details: row.try_get("details")?,
            success: row.try_get("success")?,
        })
    }
}

#[async_trait]
impl SecurityEventStore for PostgresEventStore {
    async fn log(&self, event: SecurityEvent) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events
                (id, timestamp, action, user_id, username, ip_address, details, success)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.timestamp)
        .bind(event.action.as_str())
        .bind(event.user_id)
        .bind(&event.username)
        .bind(&event.ip_address)
        .bind(&event.details)
        .bind(event.success)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> StorageResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM security_events ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn for_user(&self, username: &str, limit: i64) -> StorageResult<Vec<SecurityEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM security_events WHERE username = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(username)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}

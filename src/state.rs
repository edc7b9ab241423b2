use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use crate::config::ServerConfig;
use crate::session::SessionStore;
use crate::storage::{
    CategoryStore, CommentStore, PostStore, SecurityEvent, SecurityEventStore, UserStore,
};

/// Main server state shared across all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub user_store: Arc<dyn UserStore>,
    pub post_store: Arc<dyn PostStore>,
    pub comment_store: Arc<dyn CommentStore>,
    pub category_store: Arc<dyn CategoryStore>,
    pub event_store: Arc<dyn SecurityEventStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub start_time: Instant,
    pub db_pool: PgPool,
}

impl ServerState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        user_store: Arc<dyn UserStore>,
        post_store: Arc<dyn PostStore>,
        comment_store: Arc<dyn CommentStore>,
        category_store: Arc<dyn CategoryStore>,
        event_store: Arc<dyn SecurityEventStore>,
        sessions: Arc<dyn SessionStore>,
        db_pool: PgPool,
    ) -> Self {
        Self {
            config,
            user_store,
            post_store,
            comment_store,
            category_store,
            event_store,
            sessions,
            start_time: Instant::now(),
            db_pool,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Append to the security event log without blocking the response
    pub fn log_event(&self, event: SecurityEvent) {
        let store = self.event_store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.log(event).await {
                error!("Failed to log security event: {}", e);
            }
        });
    }
}

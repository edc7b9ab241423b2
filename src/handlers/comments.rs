use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::validate_email;
use crate::errors::ApiError;
use crate::session::Session;
use crate::state::ServerState;
use crate::storage::{
    Comment, CommentStatus, NewComment, Pagination, Role, SecurityAction, SecurityEvent,
    StorageError,
};

/// Comment attempts allowed per sliding window
const COMMENT_MAX_ATTEMPTS: usize = 5;
/// Rate-limit window in seconds
const RATE_WINDOW_SECONDS: i64 = 300;
/// Maximum comment length in characters
const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
    /// Guest commenters identify themselves with a name and email
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateCommentRequest {
    /// approved, rejected or spam
    pub status: String,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentRequest {
    pub csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub success: bool,
    pub message: String,
    pub comment: Comment,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub success: bool,
    pub comments: Vec<Comment>,
    pub pagination: Pagination,
}

/// Add a comment to a post. Logged-in users are auto-approved; guest
/// comments are held for moderation.
pub async fn create_comment(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    session: Session,
    Path(post_id): Path<Uuid>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        state.log_event(
            SecurityEvent::new(SecurityAction::CsrfRejected)
                .ip(addr.ip())
                .details(json!({ "endpoint": "comment" }))
                .failure(),
        );
        return Err(ApiError::invalid_csrf());
    }

    let key = format!("comment:{}", addr.ip());
    if !session.check_and_record(&key, COMMENT_MAX_ATTEMPTS, RATE_WINDOW_SECONDS) {
        state.log_event(
            SecurityEvent::new(SecurityAction::RateLimited)
                .ip(addr.ip())
                .details(json!({ "key": "comment" }))
                .failure(),
        );
        return Err(ApiError::RateLimited("comment".to_string()));
    }

    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::validation(format!(
            "Comment is too long (max {} characters)",
            MAX_COMMENT_CHARS
        )));
    }

    let post = state.post_store.get_post(post_id).await?;
    if !post.allow_comments {
        return Err(ApiError::Forbidden(
            "Comments are disabled on this post".to_string(),
        ));
    }

    if let Some(parent_id) = request.parent_id {
        let parent = state.comment_store.get_comment(parent_id).await?;
        if parent.post_id != post_id {
            return Err(ApiError::validation(
                "Parent comment belongs to a different post",
            ));
        }
    }

    let user = session.current_user();
    let new_comment = match &user {
        Some(user) => NewComment {
            post_id,
            parent_id: request.parent_id,
            user_id: Some(user.id),
            author_name: None,
            author_email: None,
            content: content.to_string(),
            status: CommentStatus::Approved,
        },
        None => {
            let name = request
                .author_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ApiError::validation("Name is required for guest comments"))?;
            let email = request
                .author_email
                .as_deref()
                .map(str::trim)
                .filter(|e| validate_email(e))
                .ok_or_else(|| {
                    ApiError::validation("A valid email is required for guest comments")
                })?;
            NewComment {
                post_id,
                parent_id: request.parent_id,
                user_id: None,
                author_name: Some(name.to_string()),
                author_email: Some(email.to_string()),
                content: content.to_string(),
                status: CommentStatus::Pending,
            }
        }
    };

    let comment = state.comment_store.create_comment(new_comment).await?;
    let message = match comment.status {
        CommentStatus::Approved => "Comment posted successfully".to_string(),
        _ => "Comment submitted and awaiting moderation".to_string(),
    };

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            success: true,
            message,
            comment,
        }),
    ))
}

/// Approved comments for a post, oldest first
pub async fn list_comments(
    State(state): State<Arc<ServerState>>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<ListCommentsQuery>,
) -> Result<Json<CommentListResponse>, ApiError> {
    // 404 for unknown posts rather than an empty page
    state.post_store.get_post(post_id).await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.config.comments_per_page)
        .clamp(1, 100);

    let (comments, total) = state
        .comment_store
        .list_for_post(post_id, page, per_page)
        .await?;

    Ok(Json(CommentListResponse {
        success: true,
        comments,
        pagination: Pagination::new(page, per_page, total),
    }))
}

/// Edit a comment; the author or an admin
pub async fn update_comment(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::validation(format!(
            "Comment is too long (max {} characters)",
            MAX_COMMENT_CHARS
        )));
    }

    let comment = state.comment_store.get_comment(id).await?;
    if comment.user_id != Some(user.id) && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "You can only edit your own comments".to_string(),
        ));
    }

    let comment = state.comment_store.update_content(id, content).await?;
    Ok(Json(CommentResponse {
        success: true,
        message: "Comment updated successfully".to_string(),
        comment,
    }))
}

/// Moderate a comment; admin only
pub async fn moderate_comment(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<ModerateCommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let admin = session.require_admin()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let status = CommentStatus::parse(&request.status)
        .filter(|s| *s != CommentStatus::Pending)
        .ok_or_else(|| {
            ApiError::validation("Status must be one of: approved, rejected, spam")
        })?;

    let comment = state.comment_store.set_status(id, status).await?;
    info!(
        "Comment {} marked {} by {}",
        id,
        status.as_str(),
        admin.username
    );
    state.log_event(
        SecurityEvent::new(SecurityAction::CommentModerated)
            .user(admin.id, &admin.username)
            .details(json!({ "comment_id": id, "status": status.as_str() })),
    );

    Ok(Json(CommentResponse {
        success: true,
        message: format!("Comment marked as {}", status.as_str()),
        comment,
    }))
}

/// Delete a comment; the author or an admin
pub async fn delete_comment(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<DeleteCommentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let comment = match state.comment_store.get_comment(id).await {
        Ok(comment) => comment,
        Err(StorageError::CommentNotFound(_)) => {
            return Err(ApiError::NotFound("Comment not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    if comment.user_id != Some(user.id) && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "You can only delete your own comments".to_string(),
        ));
    }

    state.comment_store.delete_comment(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Comment deleted successfully"
    })))
}

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::session::{AuthUser, Session};
use crate::state::ServerState;
use crate::storage::{
    NewPost, Pagination, Post, PostFilter, PostSort, PostStatus, Role, SecurityAction,
    SecurityEvent, UpdatePost,
};

/// File extensions accepted for uploaded images
const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

const MAX_TAGS_PER_POST: usize = 10;
const MAX_TAG_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub author: Option<String>,
    pub sort: Option<PostSort>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub status: Option<String>,
    pub allow_comments: Option<bool>,
    /// Category slugs; unknown slugs are ignored
    #[serde(default)]
    pub categories: Vec<String>,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    /// Explicit null clears the image; absent leaves it untouched
    #[serde(default, with = "double_option")]
    pub featured_image: Option<Option<String>>,
    pub status: Option<String>,
    pub allow_comments: Option<bool>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub csrf_token: Option<String>,
}

/// Distinguishes an absent JSON field from an explicit null
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub success: bool,
    pub post: Post,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub success: bool,
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

/// Body for mutations that carry nothing but the CSRF token
#[derive(Debug, Deserialize)]
pub struct CsrfBody {
    pub csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub success: bool,
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}

fn parse_status(value: &str) -> Result<PostStatus, ApiError> {
    PostStatus::parse(value)
        .ok_or_else(|| ApiError::validation(format!("Unknown post status: {}", value)))
}

fn validate_tags(tags: &[String]) -> Result<(), ApiError> {
    if tags.len() > MAX_TAGS_PER_POST {
        return Err(ApiError::validation(format!(
            "Too many tags (max {})",
            MAX_TAGS_PER_POST
        )));
    }
    for tag in tags {
        if tag.trim().chars().count() > MAX_TAG_CHARS {
            return Err(ApiError::validation(format!(
                "Tag is too long (max {} characters)",
                MAX_TAG_CHARS
            )));
        }
    }
    Ok(())
}

/// A post is visible when published, or when the requester authored it or
/// is an admin
fn can_view(post: &Post, user: Option<&AuthUser>) -> bool {
    if post.status == PostStatus::Published {
        return true;
    }
    match user {
        Some(user) => user.role == Role::Admin || user.id == post.author_id,
        None => false,
    }
}

fn can_edit(post: &Post, user: &AuthUser) -> bool {
    user.role == Role::Admin || user.id == post.author_id
}

/// Public post listing; drafts and private posts need an admin asking for
/// them explicitly
pub async fn list_posts(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PostListResponse>, ApiError> {
    let is_admin = session
        .current_user()
        .map(|u| u.role == Role::Admin)
        .unwrap_or(false);

    let status = match query.status.as_deref() {
        Some(value) if is_admin => Some(parse_status(value)?),
        _ => Some(PostStatus::Published),
    };

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.config.posts_per_page)
        .clamp(1, 50);

    let filter = PostFilter {
        status,
        category_slug: query.category,
        tag_slug: query.tag,
        search: query.search,
        author_username: query.author,
        sort: query.sort.unwrap_or_default(),
    };

    let (posts, total) = state.post_store.list_posts(&filter, page, per_page).await?;

    Ok(Json(PostListResponse {
        success: true,
        posts,
        pagination: Pagination::new(page, per_page, total),
    }))
}

/// Fetch a single post by id or slug; bumps the view counter on published
/// posts
pub async fn get_post(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id_or_slug): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = match Uuid::from_str(&id_or_slug) {
        Ok(id) => state.post_store.get_post(id).await?,
        Err(_) => state.post_store.get_post_by_slug(&id_or_slug).await?,
    };

    if !can_view(&post, session.current_user().as_ref()) {
        // Hide the existence of unpublished posts
        return Err(ApiError::NotFound("Post not found".to_string()));
    }

    if post.status == PostStatus::Published {
        if let Err(e) = state.post_store.increment_views(post.id).await {
            warn!("Failed to increment views for {}: {}", post.id, e);
        }
    }

    Ok(Json(PostResponse {
        success: true,
        post,
    }))
}

/// Create a post; any logged-in user can write
pub async fn create_post(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if title.len() > 255 {
        return Err(ApiError::validation("Title is too long (max 255 characters)"));
    }
    if request.content.trim().is_empty() {
        return Err(ApiError::validation("Content is required"));
    }
    validate_tags(&request.tags)?;

    let status = match request.status.as_deref() {
        Some(value) => parse_status(value)?,
        None => PostStatus::Draft,
    };

    let category_ids = state.category_store.resolve_slugs(&request.categories).await?;

    let post = state
        .post_store
        .create_post(NewPost {
            title: title.to_string(),
            content: request.content,
            excerpt: request.excerpt.filter(|e| !e.trim().is_empty()),
            featured_image: request.featured_image,
            author_id: user.id,
            status,
            allow_comments: request.allow_comments.unwrap_or(true),
            category_ids,
            tags: request.tags,
        })
        .await?;

    info!("Post '{}' created by {}", post.slug, user.username);
    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            success: true,
            post,
        }),
    ))
}

/// Update a post; author or admin only
pub async fn update_post(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let current = state.post_store.get_post(id).await?;
    if !can_edit(&current, &user) {
        return Err(ApiError::Forbidden(
            "You can only edit your own posts".to_string(),
        ));
    }

    if let Some(title) = request.title.as_deref() {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Title cannot be empty"));
        }
        if title.len() > 255 {
            return Err(ApiError::validation("Title is too long (max 255 characters)"));
        }
    }
    if let Some(content) = request.content.as_deref() {
        if content.trim().is_empty() {
            return Err(ApiError::validation("Content cannot be empty"));
        }
    }
    if let Some(tags) = request.tags.as_deref() {
        validate_tags(tags)?;
    }

    let status = match request.status.as_deref() {
        Some(value) => Some(parse_status(value)?),
        None => None,
    };
    let category_ids = match request.categories {
        Some(slugs) => Some(state.category_store.resolve_slugs(&slugs).await?),
        None => None,
    };

    let post = state
        .post_store
        .update_post(
            id,
            UpdatePost {
                title: request.title.map(|t| t.trim().to_string()),
                content: request.content,
                excerpt: request.excerpt,
                featured_image: request.featured_image,
                status,
                allow_comments: request.allow_comments,
                category_ids,
                tags: request.tags,
            },
        )
        .await?;

    Ok(Json(PostResponse {
        success: true,
        post,
    }))
}

/// Delete a post; author or admin only
pub async fn delete_post(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<CsrfBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let post = state.post_store.get_post(id).await?;
    if !can_edit(&post, &user) {
        return Err(ApiError::Forbidden(
            "You can only delete your own posts".to_string(),
        ));
    }

    state.post_store.delete_post(id).await?;
    info!("Post '{}' deleted by {}", post.slug, user.username);
    state.log_event(
        SecurityEvent::new(SecurityAction::PostDeleted)
            .user(user.id, &user.username)
            .details(json!({ "post_id": id, "slug": post.slug })),
    );

    Ok(Json(json!({
        "success": true,
        "message": "Post deleted successfully"
    })))
}

/// Toggle a like on a post
pub async fn toggle_like(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<CsrfBody>,
) -> Result<Json<LikeResponse>, ApiError> {
    let user = session.require_login()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let (liked, like_count) = state.post_store.toggle_like(id, user.id).await?;
    Ok(Json(LikeResponse {
        success: true,
        liked,
        like_count,
    }))
}

/// Accept an image upload and store it under a random name
pub async fn upload_image(
    State(state): State<Arc<ServerState>>,
    session: Session,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let user = session.require_login()?;

    let mut csrf_token: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?
    {
        match field.name() {
            Some("csrf_token") => {
                csrf_token = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?,
                );
            }
            Some("image") => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::validation("Image field needs a filename"))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    if !session.verify_csrf(csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let (filename, data) = file.ok_or_else(|| ApiError::validation("No image provided"))?;

    if data.is_empty() {
        return Err(ApiError::validation("Uploaded file is empty"));
    }
    if data.len() as u64 > state.config.max_upload_size {
        return Err(ApiError::validation(format!(
            "File too large (max {} bytes)",
            state.config.max_upload_size
        )));
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            ApiError::validation("Unsupported file type (jpg, png, gif, webp only)")
        })?;

    let stored_name = format!("{}.{}", Uuid::new_v4(), extension);
    let directory = &state.config.upload_directory;
    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| ApiError::Internal(format!("creating upload directory: {}", e)))?;
    tokio::fs::write(directory.join(&stored_name), &data)
        .await
        .map_err(|e| ApiError::Internal(format!("writing upload: {}", e)))?;

    info!("Image {} uploaded by {}", stored_name, user.username);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            url: format!("/uploads/{}", stored_name),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tags_accepts_reasonable_input() {
        let tags: Vec<String> = vec!["rust".into(), "web dev".into()];
        assert!(validate_tags(&tags).is_ok());
        assert!(validate_tags(&[]).is_ok());
    }

    #[test]
    fn test_validate_tags_rejects_too_many() {
        let tags: Vec<String> = (0..=MAX_TAGS_PER_POST).map(|i| format!("tag-{}", i)).collect();
        assert!(validate_tags(&tags).is_err());
    }

    #[test]
    fn test_validate_tags_rejects_oversized_names() {
        let tags = vec!["x".repeat(MAX_TAG_CHARS + 1)];
        assert!(validate_tags(&tags).is_err());
        // Character count, not byte count
        let tags = vec!["ü".repeat(MAX_TAG_CHARS)];
        assert!(validate_tags(&tags).is_ok());
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::session::Session;
use crate::state::ServerState;
use crate::storage::Category;

#[derive(Debug, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub success: bool,
    pub categories: Vec<CategoryWithCount>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCategoryRequest {
    pub csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub success: bool,
    pub category: Category,
}

/// Public category listing with post counts
pub async fn list_categories(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let categories = state
        .category_store
        .list_categories()
        .await?
        .into_iter()
        .map(|(category, post_count)| CategoryWithCount {
            category,
            post_count,
        })
        .collect();

    Ok(Json(CategoryListResponse {
        success: true,
        categories,
    }))
}

/// Create a category; admin only
pub async fn create_category(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    session.require_admin()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Category name is required"));
    }
    if name.len() > 100 {
        return Err(ApiError::validation(
            "Category name is too long (max 100 characters)",
        ));
    }

    let category = state
        .category_store
        .create_category(name, request.description.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CategoryResponse {
            success: true,
            category,
        }),
    ))
}

/// Delete a category; admin only. Posts keep existing, only the link goes.
pub async fn delete_category(
    State(state): State<Arc<ServerState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(request): Json<DeleteCategoryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    session.require_admin()?;
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        return Err(ApiError::invalid_csrf());
    }

    state.category_store.delete_category(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Category deleted successfully"
    })))
}

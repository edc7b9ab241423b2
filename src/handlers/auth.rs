use axum::{
    extract::{ConnectInfo, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{
    hash_password, validate_email, validate_password_strength, validate_username, verify_password,
};
use crate::errors::ApiError;
use crate::session::Session;
use crate::state::ServerState;
use crate::storage::{CreateUser, Role, SecurityAction, SecurityEvent, StorageError};

/// Login attempts allowed per sliding window
const LOGIN_MAX_ATTEMPTS: usize = 5;
/// Registration attempts allowed per sliding window
const REGISTER_MAX_ATTEMPTS: usize = 3;
/// Rate-limit window in seconds
const RATE_WINDOW_SECONDS: i64 = 300;

/// CSRF token response (canonical shape; the field is always `csrf_token`)
#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Login request; `login` accepts a username or an email address
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    pub csrf_token: Option<String>,
}

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub csrf_token: Option<String>,
}

/// User payload returned from login and status (no sensitive fields)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StatusUser>,
}

#[derive(Debug, Serialize)]
pub struct StatusUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub logged_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckUsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CheckUsernameResponse {
    pub available: bool,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// Issue (or re-issue) the session's CSRF token
pub async fn csrf_token(session: Session) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse {
        csrf_token: session.csrf_token(),
    })
}

/// Login endpoint: CSRF check, then rate limit, then credentials
pub async fn login(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        state.log_event(
            SecurityEvent::new(SecurityAction::CsrfRejected)
                .ip(addr.ip())
                .details(json!({ "endpoint": "login" }))
                .failure(),
        );
        return Err(ApiError::invalid_csrf());
    }

    let key = format!("login:{}", addr.ip());
    if !session.check_and_record(&key, LOGIN_MAX_ATTEMPTS, RATE_WINDOW_SECONDS) {
        state.log_event(
            SecurityEvent::new(SecurityAction::RateLimited)
                .ip(addr.ip())
                .details(json!({ "key": "login" }))
                .failure(),
        );
        return Err(ApiError::RateLimited("login".to_string()));
    }

    if request.login.is_empty() || request.password.is_empty() {
        return Err(ApiError::validation("Login and password are required"));
    }

    let user = match state.user_store.get_user_by_login(&request.login).await {
        Ok(user) => user,
        Err(StorageError::UserNotFound(_)) => {
            warn!("Login attempt for unknown account: {}", request.login);
            state.log_event(
                SecurityEvent::new(SecurityAction::LoginFailed)
                    .ip(addr.ip())
                    .details(json!({ "login": request.login, "reason": "unknown_account" }))
                    .failure(),
            );
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    match verify_password(&request.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Invalid password for user: {}", user.username);
            state.log_event(
                SecurityEvent::new(SecurityAction::LoginFailed)
                    .user(user.id, &user.username)
                    .ip(addr.ip())
                    .details(json!({ "reason": "invalid_password" }))
                    .failure(),
            );
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(ApiError::Internal(format!("password verification: {e}"))),
    }

    if !user.is_verified {
        return Err(ApiError::Forbidden(
            "Please verify your email address before logging in".to_string(),
        ));
    }
    if !user.is_active {
        warn!("Login attempt for suspended user: {}", user.username);
        return Err(ApiError::Forbidden("Account is suspended".to_string()));
    }

    // Session fixation defense: new id, same session state
    state.sessions.regenerate_id(session.inner());
    session.set_user(user.id, &user.username, user.role);

    if let Err(e) = state.user_store.update_last_login(user.id).await {
        // Non-fatal, continue with login
        warn!("Failed to update last login for {}: {}", user.username, e);
    }

    info!("User {} logged in", user.username);
    state.log_event(
        SecurityEvent::new(SecurityAction::LoginSuccess)
            .user(user.id, &user.username)
            .ip(addr.ip()),
    );

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        },
    }))
}

/// Registration endpoint
pub async fn register(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if !session.verify_csrf(request.csrf_token.as_deref()) {
        state.log_event(
            SecurityEvent::new(SecurityAction::CsrfRejected)
                .ip(addr.ip())
                .details(json!({ "endpoint": "register" }))
                .failure(),
        );
        return Err(ApiError::invalid_csrf());
    }

    let key = format!("register:{}", addr.ip());
    if !session.check_and_record(&key, REGISTER_MAX_ATTEMPTS, RATE_WINDOW_SECONDS) {
        state.log_event(
            SecurityEvent::new(SecurityAction::RateLimited)
                .ip(addr.ip())
                .details(json!({ "key": "register" }))
                .failure(),
        );
        return Err(ApiError::RateLimited("registration".to_string()));
    }

    let username = request.username.trim();
    let email = request.email.trim();
    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();

    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    validate_username(username).map_err(ApiError::validation)?;
    if !validate_email(email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    if let Err(problems) = validate_password_strength(&request.password) {
        return Err(ApiError::validation(format!(
            "Password validation failed: {}",
            problems.join(", ")
        )));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::Internal(format!("password hashing: {e}")))?;

    let verification_token = generate_verification_token();
    let user = state
        .user_store
        .create_user(CreateUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            role: Role::User,
            verification_token: Some(verification_token.clone()),
        })
        .await?;

    // Mail delivery is not wired up; surface the token in the server log so
    // operators can relay it
    info!(
        "Verification token for {}: {}",
        user.username, verification_token
    );
    state.log_event(
        SecurityEvent::new(SecurityAction::UserRegistered)
            .user(user.id, &user.username)
            .ip(addr.ip()),
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Account created successfully. Please check your email for verification."
                .to_string(),
            user_id: user.id,
        }),
    ))
}

/// Logout endpoint; idempotent
pub async fn logout(
    State(state): State<Arc<ServerState>>,
    session: Session,
) -> Json<MessageResponse> {
    let user = session.current_user();
    if let Some(user) = &user {
        state.log_event(SecurityEvent::new(SecurityAction::Logout).user(user.id, &user.username));
    }

    // Anonymous sessions are destroyed too; any CSRF token issued to the
    // session must not outlive it
    session.destroy();

    Json(MessageResponse {
        success: true,
        message: if user.is_some() {
            "Logged out successfully".to_string()
        } else {
            "Already logged out".to_string()
        },
    })
}

/// Session status endpoint
pub async fn status(session: Session) -> Json<StatusResponse> {
    match session.current_user() {
        Some(user) => {
            let logged_in_at = session.logged_in_at();
            Json(StatusResponse {
                success: true,
                authenticated: true,
                user: Some(StatusUser {
                    id: user.id,
                    username: user.username,
                    role: user.role,
                    logged_in_at,
                }),
            })
        }
        None => Json(StatusResponse {
            success: false,
            authenticated: false,
            user: None,
        }),
    }
}

/// Username availability check for signup forms
pub async fn check_username(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CheckUsernameQuery>,
) -> Result<Json<CheckUsernameResponse>, ApiError> {
    if let Err(problem) = validate_username(&query.username) {
        return Ok(Json(CheckUsernameResponse {
            available: false,
            username: query.username,
            message: Some(problem.to_string()),
        }));
    }

    let exists = state.user_store.username_exists(&query.username).await?;
    Ok(Json(CheckUsernameResponse {
        available: !exists,
        username: query.username,
        message: None,
    }))
}

/// Email verification endpoint
pub async fn verify_email(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    if query.token.is_empty() {
        return Err(ApiError::validation("Verification token is required"));
    }

    let user = state.user_store.verify_email(&query.token).await?;
    state.log_event(
        SecurityEvent::new(SecurityAction::EmailVerified).user(user.id, &user.username),
    );

    Ok(Json(MessageResponse {
        success: true,
        message: "Email verified successfully. You can now log in.".to_string(),
    }))
}

/// Random token for email verification links
fn generate_verification_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

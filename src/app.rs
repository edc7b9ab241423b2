use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::warn;

use crate::handlers::{auth, categories, comments, health, posts};
use crate::session::{session_middleware, SessionLayer};
use crate::state::ServerState;

/// JSON request bodies stay small; uploads get their own limit
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Build the full application router. Exposed separately from serving so
/// tests can drive it with `tower::ServiceExt::oneshot`.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let session_layer = SessionLayer::new(
        state.sessions.clone(),
        state.config.session_lifetime_seconds,
        state.config.cookie_secure,
    );

    let upload_limit = state.config.max_upload_size as usize + JSON_BODY_LIMIT;

    let auth_routes = Router::new()
        .route("/csrf-token", get(auth::csrf_token))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/status", get(auth::status))
        .route("/check-username", get(auth::check_username))
        .route("/verify-email", get(auth::verify_email));

    let post_routes = Router::new()
        .route("/", get(posts::list_posts).post(posts::create_post))
        .route(
            "/upload",
            post(posts::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/{id}/like", post(posts::toggle_like))
        .route(
            "/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        );

    let comment_routes = Router::new()
        .route(
            "/{id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/{id}/moderate", post(comments::moderate_comment));

    let category_routes = Router::new()
        .route(
            "/",
            get(categories::list_categories).post(categories::create_category),
        )
        .route("/{id}", delete(categories::delete_category));

    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/info", get(health::server_info))
        .nest("/api/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/categories", category_routes)
        .layer(middleware::from_fn_with_state(
            session_layer,
            session_middleware,
        ))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .with_state(state)
}

/// CORS for browser clients; cookies require explicit origins, never a
/// wildcard
fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
}

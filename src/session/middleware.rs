use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tracing::warn;

use super::store::{SessionStore, SharedSession};
use crate::errors::ApiError;
use crate::storage::Role;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Configuration and store shared with the session middleware
#[derive(Clone)]
pub struct SessionLayer {
    pub store: Arc<dyn SessionStore>,
    pub cookie_name: String,
    pub lifetime_seconds: i64,
    /// Set the Secure attribute on the cookie (enable behind HTTPS)
    pub cookie_secure: bool,
}

impl SessionLayer {
    pub fn new(store: Arc<dyn SessionStore>, lifetime_seconds: i64, cookie_secure: bool) -> Self {
        Self {
            store,
            cookie_name: "blog_session".to_string(),
            lifetime_seconds,
            cookie_secure,
        }
    }

    fn cookie_header(&self, value: &str, max_age: i64) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name, value, max_age
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie.parse().ok()
    }
}

/// Cloneable per-request handle to the session. The inner mutex serializes
/// concurrent requests arriving with the same cookie.
#[derive(Clone)]
pub struct Session(pub(crate) SharedSession);

impl Session {
    pub fn id(&self) -> String {
        self.0.lock().id.clone()
    }

    /// End the session: the middleware drops the server-side record and
    /// expires the cookie once the response is built.
    pub fn destroy(&self) {
        self.0.lock().destroy();
    }

    /// Record a successful login on this session
    pub fn set_user(&self, user_id: Uuid, username: &str, role: Role) {
        self.0.lock().set_user(user_id, username, role);
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        self.0.lock().logged_in_at
    }

    pub(crate) fn inner(&self) -> &SharedSession {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn for_testing(session: SharedSession) -> Self {
        Self(session)
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            ApiError::Internal("session middleware not installed".to_string())
        })
    }
}

/// Load (or create) the session identified by the request cookie, expose it
/// to the handler through request extensions, and persist the outcome in the
/// Set-Cookie header afterwards.
pub async fn session_middleware(
    State(layer): State<SessionLayer>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = jar
        .get(&layer.cookie_name)
        .and_then(|cookie| layer.store.load(cookie.value()))
        .unwrap_or_else(|| layer.store.create());

    request.extensions_mut().insert(Session(session.clone()));

    let mut response = next.run(request).await;

    let (id, destroyed) = {
        let guard = session.lock();
        (guard.id.clone(), guard.destroyed)
    };

    let header = if destroyed {
        layer.store.destroy(&id);
        layer.cookie_header("", 0)
    } else {
        layer.cookie_header(&id, layer.lifetime_seconds)
    };

    match header {
        Some(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        None => warn!("failed to encode session cookie header"),
    }

    response
}

use uuid::Uuid;

use super::middleware::Session;
use crate::errors::ApiError;
use crate::storage::Role;

/// Identity of the logged-in user, read from the session
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl Session {
    /// The logged-in user, if any. Pure read of session state; no database
    /// access.
    pub fn current_user(&self) -> Option<AuthUser> {
        let guard = self.0.lock();
        let id = guard.user_id?;
        Some(AuthUser {
            id,
            username: guard.username.clone().unwrap_or_default(),
            role: guard.role.unwrap_or_default(),
        })
    }

    /// Gate for authenticated endpoints: 401 when nobody is logged in.
    pub fn require_login(&self) -> Result<AuthUser, ApiError> {
        self.current_user().ok_or(ApiError::Unauthorized)
    }

    /// Gate for admin endpoints: login first (401), then role check (403).
    pub fn require_admin(&self) -> Result<AuthUser, ApiError> {
        let user = self.require_login()?;
        if !user.is_admin() {
            return Err(ApiError::admin_required());
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{MemorySessionStore, SessionStore};
    use axum::http::StatusCode;

    fn session() -> Session {
        let store = MemorySessionStore::new(3600);
        Session::for_testing(store.create())
    }

    #[test]
    fn test_anonymous_session_has_no_user() {
        let session = session();
        assert!(session.current_user().is_none());

        let err = session.require_login().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_login_passes_for_logged_in_user() {
        let session = session();
        let id = Uuid::new_v4();
        session.0.lock().set_user(id, "alice", Role::User);

        let user = session.require_login().expect("logged in");
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");
        assert!(!user.is_admin());
    }

    #[test]
    fn test_require_admin_rejects_regular_user() {
        let session = session();
        session.0.lock().set_user(Uuid::new_v4(), "bob", Role::User);

        let err = session.require_admin().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Admin privileges required");
    }

    #[test]
    fn test_require_admin_rejects_anonymous_with_401() {
        let err = session().require_admin().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_admin_passes_for_admin() {
        let session = session();
        session
            .0
            .lock()
            .set_user(Uuid::new_v4(), "root", Role::Admin);

        assert!(session.require_admin().is_ok());
    }

    #[test]
    fn test_destroy_logs_out() {
        let session = session();
        session.0.lock().set_user(Uuid::new_v4(), "eve", Role::User);
        session.destroy();
        assert!(session.current_user().is_none());
    }
}

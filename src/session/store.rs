use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::storage::Role;

/// Generate a secure random session id (64 hex characters)
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Server-side state associated with one browser via the session cookie.
///
/// Everything the request-authorization layer needs lives here: the logged-in
/// identity, the CSRF token and the rate-limit buckets. Nothing in this struct
/// touches the database.
#[derive(Debug)]
pub struct SessionData {
    pub id: String,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub logged_in_at: Option<DateTime<Utc>>,
    pub(crate) csrf_token: Option<String>,
    pub(crate) rate_buckets: HashMap<String, Vec<DateTime<Utc>>>,
    pub expires_at: DateTime<Utc>,
    pub(crate) destroyed: bool,
}

impl SessionData {
    pub fn new(lifetime_seconds: i64) -> Self {
        Self {
            id: generate_session_id(),
            user_id: None,
            username: None,
            role: None,
            logged_in_at: None,
            csrf_token: None,
            rate_buckets: HashMap::new(),
            expires_at: Utc::now() + Duration::seconds(lifetime_seconds),
            destroyed: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Record a successful login. The CSRF token survives so the form that
    /// performed the login keeps working.
    pub fn set_user(&mut self, user_id: Uuid, username: &str, role: Role) {
        self.user_id = Some(user_id);
        self.username = Some(username.to_string());
        self.role = Some(role);
        self.logged_in_at = Some(Utc::now());
    }

    /// Mark the session for destruction; the middleware removes the record
    /// and expires the cookie after the response is built.
    pub fn destroy(&mut self) {
        self.user_id = None;
        self.username = None;
        self.role = None;
        self.logged_in_at = None;
        self.csrf_token = None;
        self.rate_buckets.clear();
        self.destroyed = true;
    }
}

/// Handle shared between the store, the middleware and the request handler.
/// The mutex serializes concurrent requests from the same browser so CSRF
/// and rate-limit updates are never lost.
pub type SharedSession = Arc<Mutex<SessionData>>;

/// Pluggable session store. The in-memory implementation below serves both
/// production (single-process deployment) and tests; a shared-cache backend
/// can implement the same interface.
pub trait SessionStore: Send + Sync {
    /// Look up a live session by id; expired sessions are dropped on access
    fn load(&self, id: &str) -> Option<SharedSession>;

    /// Create and register a fresh session
    fn create(&self) -> SharedSession;

    /// Remove a session record
    fn destroy(&self, id: &str);

    /// Give the session a new id, keeping its state (login fixation defense)
    fn regenerate_id(&self, session: &SharedSession) -> String;

    /// Drop expired sessions; returns how many were removed
    fn cleanup_expired(&self) -> usize;

    /// Number of live sessions
    fn count(&self) -> usize;
}

/// In-memory session store
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    lifetime_seconds: i64,
}

impl MemorySessionStore {
    pub fn new(lifetime_seconds: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime_seconds,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &str) -> Option<SharedSession> {
        let expired = {
            let sessions = self.sessions.read();
            match sessions.get(id) {
                Some(session) => {
                    if session.lock().is_expired() {
                        true
                    } else {
                        return Some(Arc::clone(session));
                    }
                }
                None => return None,
            }
        };
        if expired {
            self.sessions.write().remove(id);
        }
        None
    }

    fn create(&self) -> SharedSession {
        let data = SessionData::new(self.lifetime_seconds);
        let id = data.id.clone();
        let session = Arc::new(Mutex::new(data));
        self.sessions.write().insert(id, Arc::clone(&session));
        session
    }

    fn destroy(&self, id: &str) {
        self.sessions.write().remove(id);
    }

    fn regenerate_id(&self, session: &SharedSession) -> String {
        let new_id = generate_session_id();
        let mut sessions = self.sessions.write();
        let old_id = {
            let mut guard = session.lock();
            let old = std::mem::replace(&mut guard.id, new_id.clone());
            guard.expires_at = Utc::now() + Duration::seconds(self.lifetime_seconds);
            old
        };
        sessions.remove(&old_id);
        sessions.insert(new_id.clone(), Arc::clone(session));
        new_id
    }

    fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.lock().is_expired());
        before - sessions.len()
    }

    fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_create_and_load() {
        let store = MemorySessionStore::new(3600);
        let session = store.create();
        let id = session.lock().id.clone();

        assert!(store.load(&id).is_some());
        assert!(store.load("not-a-session").is_none());
    }

    #[test]
    fn test_destroy_removes_record() {
        let store = MemorySessionStore::new(3600);
        let session = store.create();
        let id = session.lock().id.clone();

        store.destroy(&id);
        assert!(store.load(&id).is_none());
    }

    #[test]
    fn test_expired_session_not_loadable() {
        let store = MemorySessionStore::new(0);
        let session = store.create();
        let id = session.lock().id.clone();

        assert!(store.load(&id).is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_regenerate_id_keeps_state() {
        let store = MemorySessionStore::new(3600);
        let session = store.create();
        let old_id = session.lock().id.clone();
        session
            .lock()
            .set_user(Uuid::new_v4(), "alice", Role::User);

        let new_id = store.regenerate_id(&session);
        assert_ne!(old_id, new_id);
        assert!(store.load(&old_id).is_none());

        let reloaded = store.load(&new_id).expect("session under new id");
        assert_eq!(reloaded.lock().username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_cleanup_expired() {
        let store = MemorySessionStore::new(3600);
        store.create();
        let stale = store.create();
        stale.lock().expires_at = Utc::now() - Duration::seconds(1);

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.count(), 1);
    }
}

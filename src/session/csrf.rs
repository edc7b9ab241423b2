use rand::RngCore;
use subtle::ConstantTimeEq;

use super::middleware::Session;

/// Generate a fresh CSRF token (32 random bytes, hex encoded)
fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Session {
    /// Return the session's CSRF token, generating one on first use.
    /// Repeated calls within the same session return the same token.
    pub fn csrf_token(&self) -> String {
        let mut guard = self.0.lock();
        guard
            .csrf_token
            .get_or_insert_with(generate_csrf_token)
            .clone()
    }

    /// Check a caller-supplied token against the session's token.
    /// Never mutates the session; false when no token has been issued,
    /// when the candidate is missing, or on mismatch. The comparison is
    /// constant-time.
    pub fn verify_csrf(&self, candidate: Option<&str>) -> bool {
        let guard = self.0.lock();
        match (&guard.csrf_token, candidate) {
            (Some(stored), Some(candidate)) => stored
                .as_bytes()
                .ct_eq(candidate.as_bytes())
                .into(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{MemorySessionStore, SessionStore};

    fn session() -> Session {
        let store = MemorySessionStore::new(3600);
        Session::for_testing(store.create())
    }

    #[test]
    fn test_issue_is_idempotent() {
        let session = session();
        let first = session.csrf_token();
        let second = session.csrf_token();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_fresh_sessions_get_distinct_tokens() {
        assert_ne!(session().csrf_token(), session().csrf_token());
    }

    #[test]
    fn test_verify_matches_exact_token_only() {
        let session = session();
        let token = session.csrf_token();

        assert!(session.verify_csrf(Some(&token)));
        assert!(!session.verify_csrf(Some("")));
        assert!(!session.verify_csrf(None));
        assert!(!session.verify_csrf(Some(&token[..token.len() - 1])));

        let other = self::session();
        let other_token = other.csrf_token();
        assert!(!session.verify_csrf(Some(&other_token)));
    }

    #[test]
    fn test_verify_without_issued_token_is_false() {
        let session = session();
        assert!(!session.verify_csrf(Some("anything")));
        assert!(!session.verify_csrf(None));
    }

    #[test]
    fn test_destroy_discards_token() {
        let session = session();
        let token = session.csrf_token();
        session.destroy();
        assert!(!session.verify_csrf(Some(&token)));
    }

    #[test]
    fn test_verify_never_issues() {
        let session = session();
        session.verify_csrf(Some("candidate"));
        // Still no token until issue is called
        assert!(!session.verify_csrf(Some("candidate")));
        let token = session.csrf_token();
        assert!(session.verify_csrf(Some(&token)));
    }
}

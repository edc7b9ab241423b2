use chrono::{DateTime, Duration, Utc};

use super::middleware::Session;
use super::store::SessionData;

impl SessionData {
    /// Sliding-window check over this session's bucket for `key`.
    ///
    /// Entries older than the window are pruned on every call; when the
    /// remaining count has reached `max_attempts` the call refuses WITHOUT
    /// recording, so a blocked client does not extend its own lockout.
    pub fn check_and_record_at(
        &mut self,
        key: &str,
        max_attempts: usize,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let window_start = now - Duration::seconds(window_seconds);
        let bucket = self.rate_buckets.entry(key.to_string()).or_default();

        bucket.retain(|ts| *ts > window_start);

        if bucket.len() >= max_attempts {
            return false;
        }

        bucket.push(now);
        true
    }
}

impl Session {
    /// Record an attempt under `key`, allowing at most `max_attempts` within
    /// any trailing `window_seconds` interval.
    pub fn check_and_record(&self, key: &str, max_attempts: usize, window_seconds: i64) -> bool {
        self.0
            .lock()
            .check_and_record_at(key, max_attempts, window_seconds, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_data() -> SessionData {
        SessionData::new(3600)
    }

    #[test]
    fn test_allows_up_to_max_attempts() {
        let mut data = session_data();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(data.check_and_record_at("login:1.2.3.4", 5, 300, now));
        }
        assert!(!data.check_and_record_at("login:1.2.3.4", 5, 300, now));
    }

    #[test]
    fn test_window_slides() {
        let mut data = session_data();
        let start = Utc::now();

        for _ in 0..5 {
            assert!(data.check_and_record_at("login", 5, 300, start));
        }
        assert!(!data.check_and_record_at("login", 5, 300, start));

        // 301 seconds later the original attempts have expired
        let later = start + Duration::seconds(301);
        assert!(data.check_and_record_at("login", 5, 300, later));
    }

    #[test]
    fn test_refusal_does_not_record() {
        let mut data = session_data();
        let start = Utc::now();

        for _ in 0..3 {
            assert!(data.check_and_record_at("register", 3, 300, start));
        }
        // Hammering while blocked must not push the window forward
        for i in 1..=10 {
            assert!(!data.check_and_record_at(
                "register",
                3,
                300,
                start + Duration::seconds(i)
            ));
        }
        assert!(data.check_and_record_at("register", 3, 300, start + Duration::seconds(301)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut data = session_data();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(data.check_and_record_at("login:1.1.1.1", 5, 300, now));
        }
        assert!(!data.check_and_record_at("login:1.1.1.1", 5, 300, now));
        assert!(data.check_and_record_at("comment:1.1.1.1", 5, 300, now));
    }

    #[test]
    fn test_stale_entries_pruned_lazily() {
        let mut data = session_data();
        let start = Utc::now();

        for _ in 0..4 {
            data.check_and_record_at("login", 5, 300, start);
        }
        // After the window has passed the bucket holds only the new attempt
        let later = start + Duration::seconds(600);
        assert!(data.check_and_record_at("login", 5, 300, later));
        assert_eq!(data.rate_buckets.get("login").map(Vec::len), Some(1));
    }
}

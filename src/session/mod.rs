mod csrf;
mod guard;
mod middleware;
mod rate_limit;
mod store;

pub use guard::AuthUser;
pub use middleware::{session_middleware, Session, SessionLayer};
pub use store::{generate_session_id, MemorySessionStore, SessionData, SessionStore};

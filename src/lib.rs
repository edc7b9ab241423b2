pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod session;
pub mod state;
pub mod storage;

pub use app::build_router;
pub use config::ServerConfig;
pub use errors::ApiError;
pub use state::ServerState;

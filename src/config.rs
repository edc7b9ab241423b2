use std::env;
use std::path::PathBuf;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// PostgreSQL database URL
    pub database_url: String,
    /// Site name reported by /info
    pub site_name: String,
    /// Session lifetime in seconds (cookie Max-Age and server-side expiry)
    pub session_lifetime_seconds: i64,
    /// Set the Secure attribute on the session cookie (enable behind HTTPS)
    pub cookie_secure: bool,
    /// Directory for uploaded images
    pub upload_directory: PathBuf,
    /// Maximum upload file size in bytes (default 5MB)
    pub max_upload_size: u64,
    /// Default page size for post listings
    pub posts_per_page: u32,
    /// Default page size for comment listings
    pub comments_per_page: u32,
    /// CORS allowed origins (comma-separated in env var)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // No default database URL: refusing to guess credentials
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        Ok(Self {
            port: env::var("BLOG_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: env::var("BLOG_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            database_url,
            site_name: env::var("SITE_NAME").unwrap_or_else(|_| "Blog Server".to_string()),
            session_lifetime_seconds: env::var("SESSION_LIFETIME_SECONDS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86400),
            cookie_secure: env::var("COOKIE_SECURE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            upload_directory: env::var("UPLOAD_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/blog-server/uploads")),
            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .unwrap_or_else(|_| "5242880".to_string()) // 5MB default
                .parse()
                .unwrap_or(5_242_880),
            posts_per_page: env::var("POSTS_PER_PAGE")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .unwrap_or(12),
            comments_per_page: env::var("COMMENTS_PER_PAGE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

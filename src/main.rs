use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blog_server::{
    app::build_router,
    cli::{Cli, Commands},
    config::ServerConfig,
    session::{MemorySessionStore, SessionStore},
    state::ServerState,
    storage::{
        PostgresCategoryStore, PostgresCommentStore, PostgresEventStore, PostgresPostStore,
        PostgresUserStore, SecurityEventStore,
    },
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    // Initialize storage layers; order matters for foreign keys
    let user_store = PostgresUserStore::new(pool.clone());
    user_store.initialize().await?;

    let category_store = PostgresCategoryStore::new(pool.clone());
    category_store.initialize().await?;

    let post_store = PostgresPostStore::new(pool.clone());
    post_store.initialize().await?;

    let comment_store = PostgresCommentStore::new(pool.clone());
    comment_store.initialize().await?;

    let event_store = PostgresEventStore::new(pool.clone());
    event_store.initialize().await?;

    // Handle CLI commands
    match cli.command {
        Some(Commands::User(cmd)) => {
            return cmd.execute(pool).await;
        }
        Some(Commands::Audit { limit, user }) => {
            let entries = if let Some(username) = user {
                event_store.for_user(&username, limit).await?
            } else {
                event_store.recent(limit).await?
            };

            println!(
                "{:<20} {:<20} {:<20} {:<18} {:<8}",
                "Timestamp", "User", "Action", "IP", "Success"
            );
            println!("{}", "-".repeat(88));

            for entry in entries {
                println!(
                    "{:<20} {:<20} {:<20} {:<18} {:<8}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.username.as_deref().unwrap_or("-"),
                    entry.action.as_str(),
                    entry.ip_address.as_deref().unwrap_or("-"),
                    if entry.success { "Yes" } else { "No" }
                );
            }

            return Ok(());
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    // Server mode
    info!("🚀 Starting Blog Server v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Site name: {}", config.site_name);
    info!("   Session lifetime: {}s", config.session_lifetime_seconds);
    info!("   Upload directory: {:?}", config.upload_directory);
    info!("   CORS origins: {:?}", config.cors_origins);
    info!("✅ Database connected and schema initialized");

    let sessions: Arc<dyn SessionStore> =
        Arc::new(MemorySessionStore::new(config.session_lifetime_seconds));

    let state = Arc::new(ServerState::new(
        config.clone(),
        Arc::new(user_store),
        Arc::new(post_store),
        Arc::new(comment_store),
        Arc::new(category_store),
        Arc::new(event_store),
        sessions.clone(),
        pool,
    ));

    // Spawn background task to cleanup expired sessions
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            let cleaned = sessions.cleanup_expired();
            if cleaned > 0 {
                info!("Cleaned up {} expired sessions", cleaned);
            }
        }
    });

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("🔑 Health endpoint: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

//! Content API Server - Main Application Entry Point
//!
//! Write-path protocols for a content API: HMAC-signed requests with nonce
//! replay protection, idempotent post creation, and cursor-paginated public
//! search.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HMAC-SHA256 request signatures with per-key nonces
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Either issue a bootstrap key and exit, or start background jobs
//! 5. Build HTTP router and start server on configured port

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use content_api_server::{
    config::Config,
    db, routes,
    services::{idempotency, key_service, nonce_ledger},
    state::AppState,
    store::postgres::PgStore,
};

#[derive(Parser)]
#[command(name = "content_api_server", version, about = "Content API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an API key directly in the database and print its secret once
    IssueKey {
        /// Human-readable label
        name: String,
        /// Scopes to grant, e.g. `keys:admin content:write`; defaults to `content:read`
        scopes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    let settings = config.auth_settings();
    anyhow::ensure!(
        settings.nonce_ttl_covers_skew(),
        "NONCE_TTL_SECS ({}) must be at least twice TIMESTAMP_SKEW_SECS ({})",
        config.nonce_ttl_secs,
        config.timestamp_skew_secs
    );
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        settings.store_timeout,
    )
    .await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));

    if let Some(Command::IssueKey { name, scopes }) = cli.command {
        let issued =
            key_service::issue_key(store.as_ref(), settings.store_timeout, &name, &scopes).await?;
        println!("key_id: {}", issued.item.key_id);
        println!("secret: {}", issued.secret);
        println!("scopes: {}", issued.item.scopes.join(","));
        return Ok(());
    }

    let state = AppState::new(store, settings);

    if let Some(interval) = config.nonce_sweep_interval() {
        nonce_ledger::spawn_nonce_sweeper(state.nonces.clone(), interval);
        tracing::info!(interval_secs = interval.as_secs(), "Nonce sweeper started");
    }
    if let Some(retention) = config.idempotency_retention() {
        idempotency::spawn_idempotency_purger(state.idempotency.clone(), retention);
        tracing::info!(
            retention_hours = config.idempotency_retention_hours,
            "Idempotency purger started"
        );
    }
    if let Some(stale_after) = config.idempotency_stale_after() {
        idempotency::spawn_stale_claim_releaser(state.idempotency.clone(), stale_after);
        tracing::info!(
            stale_after_secs = stale_after.as_secs(),
            "Stale idempotency claim releaser started"
        );
    }

    let app = routes::build_router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

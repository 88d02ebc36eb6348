//! Inkpost server binary

use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inkpost::{
    api::{self, AppState},
    config::Config,
    db::{self, Database},
    services::PasswordHasher,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkpost=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Inkpost {}", env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("INKPOST_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load_with_env(Path::new(&config_path))
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    tracing::info!("Configuration loaded (runtime: {})", config.runtime);

    let database = Database::connect(config.runtime, &config.database)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    let applied = db::migrations::run_migrations(&database).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let hasher = PasswordHasher::new(config.runtime, &config.auth);
    let state = AppState::new(database.clone(), hasher, config.server.api_token.clone());

    match state.users.count_legacy_hashes().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(
            "{} user(s) still have non-{} password hashes; they migrate on next login",
            n,
            hasher.native_format()
        ),
        Err(e) => tracing::warn!("Failed to count legacy password hashes: {}", e),
    }
    if state.api_token.is_none() {
        tracing::warn!("No API token configured; the admin API is disabled");
    }

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

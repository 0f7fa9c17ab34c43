//! Credential Service
//! Mission: Issue, rotate and revoke credentials behind a small HTTP API

use anyhow::{Context, Result};
use clap::Parser;
use credential_service::{
    auth::{AuthService, PasswordHasher, SqliteCredentialStore, TokenCodec},
    config::{AppEnv, Config},
    router,
};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let config = Config::parse();
    init_tracing(config.app_env);
    config.validate()?;

    info!(env = ?config.app_env, "Credential service starting");

    let store = Arc::new(SqliteCredentialStore::open(
        &config.db_path,
        config.db_pool_size,
    )?);
    let codec = Arc::new(TokenCodec::new(config.jwt_secret.as_bytes()));
    let hasher = Arc::new(
        PasswordHasher::new(config.bcrypt_cost).context("Invalid BCRYPT_COST")?,
    );
    let service = AuthService::new(store, codec, hasher, config.service_settings());

    match config.bootstrap_admin() {
        Some((email, password)) => {
            service
                .bootstrap_admin(email, password)
                .await
                .context("Failed to bootstrap admin user")?;
        }
        None => {
            if !service
                .has_admin()
                .await
                .context("Failed to check for admin users")?
            {
                warn!("No admin user exists; set ADMIN_EMAIL and ADMIN_PASSWORD to create one");
            }
        }
    }

    let app = router(service);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Credential service stopped");
    Ok(())
}

/// Initialize tracing: human-readable locally, JSON elsewhere
fn init_tracing(app_env: AppEnv) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| app_env.default_filter().into());

    let registry = tracing_subscriber::registry().with(filter);
    if app_env.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

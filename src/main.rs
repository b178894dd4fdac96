// src/main.rs
//! Thin process entrypoint: load configuration, apply migrations, build the
//! vault registry. No transport is wired up here (spec §1) — this binary is
//! a host that an RPC/HTTP layer embeds, not a server in itself.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

use osqr_vault::config::VaultConfig;
use osqr_vault::VaultRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = VaultConfig::from_env();
    config.validate()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    osqr_vault::migrations::run_migrations(&pool).await?;

    let registry = Arc::new(VaultRegistry::new(pool, config));

    tracing::info!("osqr-vault ready");

    shutdown_signal().await;
    registry.shutdown_all().await;
    tracing::info!("osqr-vault shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to install ctrl-c handler, exiting immediately");
    }
}

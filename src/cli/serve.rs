// ABOUTME: CLI serve command - run the pool in the foreground until interrupted
//
// Starts every enabled server, keeps health monitors running, and shuts
// the pool down cleanly on Ctrl-C.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::start_pool;

/// Execute the serve command
pub async fn execute(config_path: Option<&Path>) -> Result<()> {
    let pool = start_pool(config_path).await?;

    let health = pool.health().await;
    info!(
        servers = pool.status().await.len(),
        tools = pool.tool_count(),
        health = ?health,
        "MCP pool serving, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested");
    pool.stop_all().await;

    let metrics = pool.metrics();
    info!(
        requests = metrics.requests,
        errors = metrics.errors,
        crashes = metrics.crashes,
        restarts = metrics.restarts,
        "MCP pool stopped"
    );
    Ok(())
}

// ABOUTME: CLI status command - per-server status, pool health and counters
//
// text: table of servers with pid, failures and last error
// json: full ProcessInfo list plus health and metrics

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use mcp_hub::mcp_pool::{HealthStatus, MetricsSnapshot, ProcessInfo};

use super::{print_json, start_pool, truncate, OutputFormat};

/// JSON output structure for status command
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub health: HealthStatus,
    pub tools: usize,
    pub servers: Vec<ProcessInfo>,
    pub metrics: MetricsSnapshot,
}

/// Execute the status command
pub async fn execute(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let pool = start_pool(config_path).await?;

    let output = StatusOutput {
        health: pool.health().await,
        tools: pool.tool_count(),
        servers: pool.process_info().await,
        metrics: pool.metrics(),
    };
    pool.stop_all().await;

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => output_text(&output),
    }
    Ok(())
}

fn health_label(health: &HealthStatus) -> String {
    match health {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded { unhealthy } => format!("degraded ({})", unhealthy.join(", ")),
        HealthStatus::Critical { failed } => format!("critical ({})", failed.join(", ")),
    }
}

fn output_text(output: &StatusOutput) {
    println!("Health: {}", health_label(&output.health));
    println!("Tools:  {}", output.tools);
    println!();

    if output.servers.is_empty() {
        println!("No servers configured.");
        return;
    }

    println!("{:<20} {:<8} {:<10} {:<8} {:<8} LAST ERROR", "SERVER", "TYPE", "STATUS", "PID", "FAILS");
    println!("{}", "-".repeat(80));

    for server in &output.servers {
        let pid = server.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
        let last_error = server.last_error.as_deref().unwrap_or("");
        println!(
            "{:<20} {:<8} {:<10} {:<8} {:<8} {}",
            truncate(&server.id, 20),
            server.server_type,
            server.status,
            pid,
            server.failure_count,
            truncate(last_error, 40)
        );
    }
}

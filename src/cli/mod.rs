// ABOUTME: CLI argument parsing and command routing for mcp-hub
//
// Provides command-line interface for:
// - Running the pool in the foreground (serve)
// - Inspecting servers and aggregated capabilities (status, tools, resources, prompts)
// - Invoking a single tool through the router (call)

pub mod call;
pub mod list;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::warn;

use mcp_hub::config::AppConfig;
use mcp_hub::mcp_pool::McpProcessPool;

/// Pool of MCP servers behind a single JSON-RPC router
#[derive(Parser)]
#[command(name = "mcp-hub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to $MCP_HUB_CONFIG, then ./mcp-hub.toml, then the user config dir)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start every enabled server and keep them supervised until Ctrl-C
    Serve,

    /// Start the pool once and report per-server status
    Status,

    /// List tools aggregated across all servers
    Tools,

    /// List resources aggregated across all servers
    Resources,

    /// List prompts aggregated across all servers
    Prompts,

    /// Call a tool on whichever server owns it
    Call(CallArgs),
}

/// Arguments for the call command
#[derive(clap::Args)]
pub struct CallArgs {
    /// Tool name
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
}

/// Load config and start a pool from it
///
/// Individual server failures are logged by the pool and never abort the
/// command; an empty server list only warns.
pub async fn start_pool(config_path: Option<&std::path::Path>) -> Result<McpProcessPool> {
    let config = AppConfig::load(config_path)?;

    if config.servers.is_empty() {
        warn!("No MCP servers configured");
    }

    let pool = McpProcessPool::new(config.pool.clone(), config.servers);
    pool.start_all().await.context("Failed to start MCP pool")?;
    Ok(pool)
}

/// Print a serializable value as pretty JSON
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
pub fn truncate(s: &str, max_len: usize) -> String {
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

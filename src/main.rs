// ABOUTME: Main entry point for mcp-hub, a supervised pool of MCP servers
//
// Binary: mcp-hub
// Usage: mcp-hub [--config FILE] [--format text|json] <COMMAND>
// - serve: run the pool until Ctrl-C
// - status: per-server status and pool health
// - tools / resources / prompts: aggregated listings
// - call: invoke a tool on its owning server

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::list::Listing;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(args.log_json);

    let config = args.config.as_deref();
    match args.command {
        Commands::Serve => cli::serve::execute(config).await,
        Commands::Status => cli::status::execute(config, args.format).await,
        Commands::Tools => cli::list::execute(Listing::Tools, config, args.format).await,
        Commands::Resources => cli::list::execute(Listing::Resources, config, args.format).await,
        Commands::Prompts => cli::list::execute(Listing::Prompts, config, args.format).await,
        Commands::Call(call_args) => cli::call::execute(call_args, config, args.format).await,
    }
}

/// Logs go to stderr so stdout stays clean for command output
fn setup_logging(json: bool) {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mcp_hub=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

// ABOUTME: CLI tools/resources/prompts commands - aggregated capability listings
//
// Each listing is the concatenation of every running server's answer, in
// configuration order.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use super::{print_json, start_pool, truncate, OutputFormat};

/// Which aggregated listing to print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Tools,
    Resources,
    Prompts,
}

impl Listing {
    const fn label(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
        }
    }

    /// Descriptor member used as the row key
    const fn key_field(self) -> &'static str {
        match self {
            Self::Resources => "uri",
            Self::Tools | Self::Prompts => "name",
        }
    }
}

/// Execute one of the listing commands
pub async fn execute(listing: Listing, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let pool = start_pool(config_path).await?;

    let items = match listing {
        Listing::Tools => pool.list_tools().await,
        Listing::Resources => pool.list_resources().await,
        Listing::Prompts => pool.list_prompts().await,
    };

    // Owners must be read before shutdown clears the routing table
    let owners: Vec<Option<String>> = if listing == Listing::Tools {
        items
            .iter()
            .map(|item| item.get("name").and_then(Value::as_str).and_then(|n| pool.tool_owner(n)))
            .collect()
    } else {
        vec![None; items.len()]
    };
    pool.stop_all().await;

    match format {
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Text => output_text(listing, &items, &owners),
    }
    Ok(())
}

fn output_text(listing: Listing, items: &[Value], owners: &[Option<String>]) {
    if items.is_empty() {
        println!("No {} found.", listing.label());
        return;
    }

    println!("{:<32} {:<16} DESCRIPTION", listing.key_field().to_uppercase(), "SERVER");
    println!("{}", "-".repeat(90));

    for (item, owner) in items.iter().zip(owners) {
        println!("{}", row(listing, item, owner.as_deref()));
    }
}

fn row(listing: Listing, item: &Value, owner: Option<&str>) -> String {
    let key = item.get(listing.key_field()).and_then(Value::as_str).unwrap_or("?");
    let description = item.get("description").and_then(Value::as_str).unwrap_or("");
    format!(
        "{:<32} {:<16} {}",
        truncate(key, 32),
        truncate(owner.unwrap_or("-"), 16),
        truncate(description, 40)
    )
}

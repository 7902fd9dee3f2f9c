// ABOUTME: CLI call command - route one tools/call through the pool
//
// Arguments come in as a JSON object string; the raw result is printed as
// JSON, or its text content blocks in text mode.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use super::{print_json, start_pool, CallArgs, OutputFormat};

/// Execute the call command
pub async fn execute(args: CallArgs, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let arguments = parse_arguments(&args.args)?;
    let pool = start_pool(config_path).await?;

    let result = pool.call_tool(&args.tool, arguments).await;
    pool.stop_all().await;

    let result = result.with_context(|| format!("Tool call '{}' failed", args.tool))?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            let text = text_content(&result);
            if text.is_empty() {
                print_json(&result)?;
            } else {
                println!("{}", text.join("\n"));
            }
        }
    }
    Ok(())
}

fn parse_arguments(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object");
    }
    Ok(value)
}

/// Text blocks of an MCP tool result's `content` array
fn text_content(result: &Value) -> Vec<&str> {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

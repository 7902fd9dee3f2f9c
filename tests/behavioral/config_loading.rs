// ABOUTME: Behavioral tests for driving the pool from a TOML config file
// Saves a config holding scripted servers, reloads it, and routes a call through it

use super::fixtures::{first_text, mock_server};
use mcp_hub::config::AppConfig;
use mcp_hub::mcp_pool::{McpProcessPool, PoolConfig, ProcessStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_saved_config_drives_the_pool() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mcp-hub.toml");

    let mut disabled = mock_server("off", &["never"]);
    disabled.enabled = false;
    let saved = AppConfig {
        pool: PoolConfig::default(),
        servers: vec![mock_server("main", &["echo"]), disabled],
    };
    saved.save(&path).unwrap();

    let loaded = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, saved);
    loaded.validate().unwrap();

    let pool = McpProcessPool::new(loaded.pool.clone(), loaded.servers);
    pool.start_all().await.unwrap();

    let status = pool.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status.get("main"), Some(&ProcessStatus::Running));

    let result = pool.call_tool("echo", json!({"text": "from disk"})).await.unwrap();
    assert_eq!(first_text(&result), Some("main:from disk"));

    pool.stop_all().await;
}

#[test]
fn test_configured_args_extend_argv() {
    let toml = r#"
[[servers]]
id = "fs"
type = "uv"
command = ["uv", "run"]
args = ["--root", "/srv"]
"#;
    let config: AppConfig = toml::from_str(toml).unwrap();
    let argv: Vec<&str> = config.servers[0].argv().collect();
    assert_eq!(argv, vec!["uv", "run", "--root", "/srv"]);
}

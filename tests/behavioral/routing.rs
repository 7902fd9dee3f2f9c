// ABOUTME: Behavioral tests for tool routing and aggregated capability listings
// Verifies calls reach the owning server and listings concatenate in config order

use super::fixtures::{fast_pool_config, first_text, mock_server, names};
use mcp_hub::config::{ManagedProcessConfig, ServerType};
use mcp_hub::mcp_pool::{McpProcessPool, PoolError, ProcessStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn started(servers: Vec<ManagedProcessConfig>) -> McpProcessPool {
    let pool = McpProcessPool::new(fast_pool_config(), servers);
    pool.start_all().await.unwrap();
    pool
}

#[tokio::test]
async fn test_call_reaches_owning_server() {
    let pool = started(vec![
        mock_server("a", &["alpha"]),
        mock_server("b", &["beta"]),
    ])
    .await;

    assert_eq!(pool.tool_count(), 2);
    assert_eq!(pool.tool_owner("alpha").as_deref(), Some("a"));
    assert_eq!(pool.tool_owner("beta").as_deref(), Some("b"));

    let alpha = pool.call_tool("alpha", json!({"text": "hi"})).await.unwrap();
    let beta = pool.call_tool("beta", json!({"text": "yo"})).await.unwrap();

    assert_eq!(first_text(&alpha), Some("a:hi"));
    assert_eq!(first_text(&beta), Some("b:yo"));
    assert_eq!(pool.metrics().requests, 2);
    assert_eq!(pool.metrics().errors, 0);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let pool = started(vec![mock_server("a", &["alpha"])]).await;

    let err = pool.call_tool("missing", json!({})).await.unwrap_err();
    assert!(matches!(err, PoolError::ToolNotFound(ref name) if name == "missing"));

    pool.stop_all().await;
}

#[tokio::test]
async fn test_remote_error_is_surfaced() {
    let pool = started(vec![mock_server("a", &["fail"])]).await;

    let err = pool.call_tool("fail", json!({})).await.unwrap_err();
    match err {
        PoolError::RemoteError { code, message, data } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "tool failed");
            assert!(data.is_none());
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(pool.metrics().errors, 1);
    assert_eq!(pool.metrics().timeouts, 0);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_listings_concatenate_in_config_order() {
    let pool = started(vec![
        mock_server("a", &["alpha", "beta"]),
        mock_server("b", &["gamma"]),
    ])
    .await;

    let tools = pool.list_tools().await;
    assert_eq!(names(&tools, "name"), vec!["alpha", "beta", "gamma"]);
    assert_eq!(tools[2]["description"], "gamma from b");

    let resources = pool.list_resources().await;
    assert_eq!(names(&resources, "uri"), vec!["mem://a", "mem://b"]);

    let prompts = pool.list_prompts().await;
    assert_eq!(names(&prompts, "name"), vec!["a-prompt", "b-prompt"]);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_duplicate_tool_routes_to_later_server() {
    let pool = started(vec![
        mock_server("first", &["shared"]),
        mock_server("second", &["shared"]),
    ])
    .await;

    assert_eq!(pool.tool_count(), 1);
    assert_eq!(pool.tool_owner("shared").as_deref(), Some("second"));
    assert_eq!(pool.list_tools().await.len(), 2);

    let result = pool.call_tool("shared", json!({"text": "x"})).await.unwrap();
    assert_eq!(first_text(&result), Some("second:x"));

    pool.stop_all().await;
}

#[tokio::test]
async fn test_failed_server_contributes_nothing() {
    let broken = ManagedProcessConfig::new(
        "broken",
        ServerType::Npx,
        vec!["/nonexistent/mcp-server".to_string()],
    );
    let pool = started(vec![broken, mock_server("ok", &["alpha"])]).await;

    let status = pool.status().await;
    assert_eq!(status.get("broken"), Some(&ProcessStatus::Failed));
    assert_eq!(status.get("ok"), Some(&ProcessStatus::Running));

    assert_eq!(names(&pool.list_resources().await, "uri"), vec!["mem://ok"]);
    let result = pool.call_tool("alpha", json!({"text": "still"})).await.unwrap();
    assert_eq!(first_text(&result), Some("ok:still"));

    pool.stop_all().await;
}

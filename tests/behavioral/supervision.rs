// ABOUTME: Behavioral tests for process supervision through the pool facade
// Verifies restart after an external kill, the failure ceiling, and status reporting

use std::process::Command;
use std::time::Duration;

use super::fixtures::{fast_pool_config, first_text, mock_server, sh_server, wait_until};
use mcp_hub::mcp_pool::{HealthStatus, McpProcessPool, PoolConfig, ProcessStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_killed_server_is_restarted() {
    let pool = McpProcessPool::new(fast_pool_config(), vec![mock_server("a", &["echo"])]);
    pool.start_all().await.unwrap();

    let original = pool.process_info().await[0].pid.unwrap();
    let status = Command::new("kill")
        .args(["-9", &original.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let watched = &pool;
    let restarted = wait_until(Duration::from_secs(5), move || async move {
        let infos = watched.process_info().await;
        infos[0].status == ProcessStatus::Running && infos[0].pid.is_some_and(|pid| pid != original)
    })
    .await;
    assert!(restarted, "server should come back with a new pid");

    let infos = pool.process_info().await;
    assert_eq!(infos[0].failure_count, 1);
    assert!(infos[0].last_error.is_some());
    assert!(pool.metrics().crashes >= 1);
    assert!(pool.metrics().restarts >= 1);

    // Routes survive a restart because the server id is unchanged
    let result = pool.call_tool("echo", json!({"text": "back"})).await.unwrap();
    assert_eq!(first_text(&result), Some("a:back"));
    assert_eq!(pool.health().await, HealthStatus::Healthy);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_restarts_stop_at_failure_ceiling() {
    let config = PoolConfig {
        max_failures: 3,
        ..fast_pool_config()
    };
    let pool = McpProcessPool::new(config, vec![sh_server("flaky", "sleep 0.05; exit 1")]);
    pool.start_all().await.unwrap();

    let watched = &pool;
    let exhausted = wait_until(Duration::from_secs(5), move || async move {
        watched.process_info().await[0].failure_count == 3 && watched.health().await.is_critical()
    })
    .await;
    assert!(exhausted, "server should end up failed after three crashes");

    // Give the monitor a few more intervals to prove it stays down
    tokio::time::sleep(Duration::from_millis(300)).await;
    let infos = pool.process_info().await;
    assert_eq!(infos[0].status, ProcessStatus::Failed);
    assert_eq!(infos[0].failure_count, 3);

    let metrics = pool.metrics();
    assert_eq!(metrics.crashes, 3);
    assert_eq!(metrics.restarts, 2);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_status_across_start_and_stop() {
    let pool = McpProcessPool::new(
        fast_pool_config(),
        vec![mock_server("a", &["alpha"]), mock_server("b", &["beta"])],
    );
    assert!(pool.status().await.is_empty());

    pool.start_all().await.unwrap();
    assert!(pool.is_started());

    let status = pool.status().await;
    assert_eq!(status.len(), 2);
    assert!(status.values().all(|s| *s == ProcessStatus::Running));

    let infos = pool.process_info().await;
    assert_eq!(infos[0].id, "a");
    assert!(infos.iter().all(|i| i.pid.is_some() && i.started_at.is_some()));
    assert_eq!(pool.health().await, HealthStatus::Healthy);

    pool.stop_all().await;
    assert!(!pool.is_started());

    let status = pool.status().await;
    assert!(status.values().all(|s| *s == ProcessStatus::Stopped));
    assert_eq!(pool.tool_count(), 0);
}

// ABOUTME: Behavioral tests for request correlation over one server's stdio
// Covers concurrent calls, reversed answers, timeouts, stalled stdin and crashes mid-request

use std::time::Duration;

use super::fixtures::{
    fast_pool_config, first_text, mock_server, names, reversing_server, stalled_server, wait_until,
};
use futures_util::future::join_all;
use mcp_hub::mcp_pool::{McpProcessPool, PoolConfig, PoolError, ProcessStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_concurrent_calls_each_get_their_own_answer() {
    let pool = McpProcessPool::new(fast_pool_config(), vec![mock_server("a", &["echo"])]);
    pool.start_all().await.unwrap();

    let texts: Vec<String> = (0..10).map(|i| format!("msg{i}")).collect();
    let results = join_all(
        texts
            .iter()
            .map(|text| pool.call_tool("echo", json!({"text": text}))),
    )
    .await;

    for (text, result) in texts.iter().zip(results) {
        let result = result.unwrap();
        assert_eq!(first_text(&result), Some(format!("a:{text}").as_str()));
    }
    assert_eq!(pool.metrics().requests, 10);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_reversed_answers_match_their_requests() {
    let pool = McpProcessPool::new(fast_pool_config(), vec![reversing_server("rev")]);
    pool.start_all().await.unwrap();
    assert_eq!(pool.tool_owner("echo").as_deref(), Some("rev"));

    let (first, second) = tokio::join!(
        pool.call_tool("echo", json!({"text": "first"})),
        pool.call_tool("echo", json!({"text": "second"})),
    );

    assert_eq!(first_text(&first.unwrap()), Some("first"));
    assert_eq!(first_text(&second.unwrap()), Some("second"));

    pool.stop_all().await;
}

#[tokio::test]
async fn test_timeout_does_not_block_other_servers() {
    let pool = McpProcessPool::new(
        fast_pool_config(),
        vec![mock_server("slow", &["hang", "ping"]), mock_server("fast", &["echo"])],
    );
    pool.start_all().await.unwrap();

    let (hung, answered) = tokio::join!(
        pool.call_tool("hang", json!({})),
        pool.call_tool("echo", json!({"text": "fine"})),
    );

    match hung.unwrap_err() {
        PoolError::Timeout { server, timeout } => {
            assert_eq!(server, "slow");
            assert_eq!(timeout, Duration::from_millis(500));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(first_text(&answered.unwrap()), Some("fast:fine"));

    // The timed out server keeps serving later requests
    let again = pool.call_tool("ping", json!({"text": "again"})).await.unwrap();
    assert_eq!(first_text(&again), Some("slow:again"));

    let metrics = pool.metrics();
    assert_eq!(metrics.requests, 3);
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.timeouts, 1);

    pool.stop_all().await;
}

#[tokio::test]
async fn test_crash_mid_request_fails_the_caller() {
    let mut server = mock_server("a", &["crash"]);
    server.restart_on_failure = false;
    let pool = McpProcessPool::new(fast_pool_config(), vec![server]);
    pool.start_all().await.unwrap();

    let err = pool.call_tool("crash", json!({})).await.unwrap_err();
    assert!(matches!(err, PoolError::ProcessCrashed { ref server } if server == "a"));

    let watched = &pool;
    let failed = wait_until(Duration::from_secs(3), move || async move {
        watched.status().await.get("a") == Some(&ProcessStatus::Failed)
    })
    .await;
    assert!(failed, "monitor should mark the crashed server failed");

    let err = pool.call_tool("crash", json!({})).await.unwrap_err();
    assert!(matches!(err, PoolError::NotRunning(ref server) if server == "a"));
    assert!(pool.health().await.is_critical());

    pool.stop_all().await;
}

#[tokio::test]
async fn test_server_not_reading_stdin_times_out() {
    let config = PoolConfig {
        request_timeout: Duration::from_millis(300),
        ..fast_pool_config()
    };
    let pool = McpProcessPool::new(
        config,
        vec![stalled_server("stuck", "big"), mock_server("ok", &["echo"])],
    );
    pool.start_all().await.unwrap();
    assert_eq!(pool.tool_owner("big").as_deref(), Some("stuck"));

    // Far larger than a pipe buffer, so the write cannot complete
    let blob = "x".repeat(256 * 1024);
    let err = tokio::time::timeout(
        Duration::from_secs(3),
        pool.call_tool("big", json!({"text": blob})),
    )
    .await
    .expect("call must finish within its deadline")
    .unwrap_err();
    assert!(matches!(err, PoolError::Timeout { ref server, .. } if server == "stuck"));
    assert_eq!(pool.metrics().timeouts, 1);

    let tools = tokio::time::timeout(Duration::from_secs(3), pool.list_tools())
        .await
        .expect("listing must not hang behind the stalled server");
    assert_eq!(names(&tools, "name"), vec!["echo"]);

    pool.stop_all().await;
}

// ABOUTME: Shared fixtures for behavioral tests: scripted MCP servers and pool settings
//
// Provides:
// - mock_server(): sh server answering listings and tools/call
// - reversing_server(): sh server answering two calls in reverse order
// - stalled_server(): sh server that stops reading stdin after discovery
// - fast_pool_config(): short timeouts and backoff
// - wait_until(): poll an async condition with a deadline

use std::future::Future;
use std::time::Duration;

use mcp_hub::config::{ManagedProcessConfig, ServerType};
use mcp_hub::mcp_pool::PoolConfig;
use serde_json::Value;

/// Shell helpers: `field NAME` pulls a string member out of `$line`,
/// `reply ID JSON` and `fail ID CODE MSG` write response frames.
const HELPERS: &str = r#"field() { printf '%s' "$line" | sed -n "s/.*\"$1\":\"\([^\"]*\)\".*/\1/p"; }
reply() { printf '{"jsonrpc":"2.0","id":"%s","result":%s}\n' "$1" "$2"; }
fail() { printf '{"jsonrpc":"2.0","id":"%s","error":{"code":%s,"message":"%s"}}\n' "$1" "$2" "$3"; }
"#;

/// Scripted MCP server
///
/// - `tools/list` returns `tools`, each described as "<tool> from <id>"
/// - `resources/list` returns one `mem://<id>` resource
/// - `prompts/list` returns one `<id>-prompt` prompt
/// - `tools/call` on `fail` answers a -32000 error, on `hang` never answers,
///   on `crash` exits, and on anything else echoes `<id>:<arguments.text>`
/// - any other method answers -32601
pub fn mock_server(id: &str, tools: &[&str]) -> ManagedProcessConfig {
    let tool_list = tools
        .iter()
        .map(|t| format!(r#"{{"name":"{t}","description":"{t} from {id}"}}"#))
        .collect::<Vec<_>>()
        .join(",");

    let script = format!(
        r#"{HELPERS}
while IFS= read -r line; do
  rid=$(field id)
  case "$(field method)" in
    tools/list) reply "$rid" '{{"tools":[{tool_list}]}}' ;;
    resources/list) reply "$rid" '{{"resources":[{{"uri":"mem://{id}"}}]}}' ;;
    prompts/list) reply "$rid" '{{"prompts":[{{"name":"{id}-prompt"}}]}}' ;;
    tools/call)
      case "$(field name)" in
        fail) fail "$rid" -32000 "tool failed" ;;
        hang) ;;
        crash) exit 1 ;;
        *) reply "$rid" "{{\"content\":[{{\"type\":\"text\",\"text\":\"{id}:$(field text)\"}}]}}" ;;
      esac ;;
    *) fail "$rid" -32601 "Method not found" ;;
  esac
done
"#
    );

    sh_server(id, &script)
}

/// Server exposing `echo` that holds the first call until the second
/// arrives, then answers the second before the first.
pub fn reversing_server(id: &str) -> ManagedProcessConfig {
    let script = format!(
        r#"{HELPERS}
IFS= read -r line
reply "$(field id)" '{{"tools":[{{"name":"echo"}}]}}'
IFS= read -r line
first_id=$(field id); first_text=$(field text)
IFS= read -r line
second_id=$(field id); second_text=$(field text)
reply "$second_id" "{{\"content\":[{{\"type\":\"text\",\"text\":\"$second_text\"}}]}}"
reply "$first_id" "{{\"content\":[{{\"type\":\"text\",\"text\":\"$first_text\"}}]}}"
cat > /dev/null
"#
    );

    sh_server(id, &script)
}

/// Server that answers the first `tools/list` with `tool`, then stops
/// reading stdin while staying alive.
pub fn stalled_server(id: &str, tool: &str) -> ManagedProcessConfig {
    let script = format!(
        r#"{HELPERS}
IFS= read -r line
reply "$(field id)" '{{"tools":[{{"name":"{tool}"}}]}}'
exec sleep 1000
"#
    );

    sh_server(id, &script)
}

/// Server running an arbitrary `sh` script
pub fn sh_server(id: &str, script: &str) -> ManagedProcessConfig {
    ManagedProcessConfig::new(
        id,
        ServerType::Python,
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    )
}

/// Pool settings with short deadlines so failure paths finish quickly
pub fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        request_timeout: Duration::from_millis(500),
        health_check_interval: Duration::from_millis(50),
        restart_backoff_base: Duration::from_millis(20),
        restart_backoff_max: Duration::from_millis(100),
        shutdown_grace: Duration::from_secs(1),
        ..PoolConfig::default()
    }
}

/// Poll `condition` every 20ms until it holds or `limit` elapses
pub async fn wait_until<F, Fut>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// First text block of a tool result
pub fn first_text(result: &Value) -> Option<&str> {
    result.get("content")?.as_array()?.first()?.get("text")?.as_str()
}

/// Values of one string member across a listing
pub fn names(items: &[Value], key: &str) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get(key).and_then(Value::as_str))
        .map(String::from)
        .collect()
}

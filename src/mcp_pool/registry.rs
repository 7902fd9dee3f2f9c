// ABOUTME: Capability discovery, aggregated listings and tool-name routing across processes
// Routing table is rebuilt wholesale on each discovery and swapped atomically

//! Capability registry.
//!
//! Discovery fans `tools/list` out to every running process in parallel and
//! rebuilds the tool name to process id map from the answers. When two
//! processes expose the same tool name, the later process in pool order
//! wins. Readers clone an `Arc` of the current table and never see a
//! partially built map.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::jsonrpc::ResponseOutcome;
use super::managed_process::ManagedProcess;

/// Kind of capability a process can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tools,
    Resources,
    Prompts,
}

impl CapabilityKind {
    /// JSON-RPC method listing this capability
    pub const fn list_method(self) -> &'static str {
        match self {
            Self::Tools => "tools/list",
            Self::Resources => "resources/list",
            Self::Prompts => "prompts/list",
        }
    }

    /// Member of the `result` object holding the descriptor array
    pub const fn result_key(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
        }
    }
}

/// Descriptors one process returned for one capability kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub server_id: String,
    pub items: Vec<Value>,
}

type RouteTable = HashMap<String, String>;

/// Tool name to owning process id.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    routes: RwLock<Arc<RouteTable>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current routing table.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, table: RouteTable) {
        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Owning process id of a tool.
    pub fn resolve(&self, tool: &str) -> Option<String> {
        self.snapshot().get(tool).cloned()
    }

    pub fn tool_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn clear(&self) {
        self.publish(RouteTable::new());
    }

    /// Rebuild the routing table from a fresh `tools/list` pass.
    ///
    /// Returns the number of routable tools.
    pub async fn discover(&self, processes: &[Arc<ManagedProcess>]) -> usize {
        let listings = Self::collect_listings(CapabilityKind::Tools, processes).await;
        let table = build_routes(&listings);
        let count = table.len();
        self.publish(table);

        info!(tools = count, servers = listings.len(), "Tool discovery complete");
        count
    }

    /// `*/list` on every running process, concatenated in process order.
    pub async fn list(kind: CapabilityKind, processes: &[Arc<ManagedProcess>]) -> Vec<Value> {
        Self::collect_listings(kind, processes)
            .await
            .into_iter()
            .flat_map(|listing| listing.items)
            .collect()
    }

    /// Query every running process in parallel; failures contribute nothing.
    pub async fn collect_listings(
        kind: CapabilityKind,
        processes: &[Arc<ManagedProcess>],
    ) -> Vec<Listing> {
        let running: Vec<&Arc<ManagedProcess>> =
            processes.iter().filter(|p| p.is_running()).collect();

        let responses = join_all(
            running
                .iter()
                .map(|process| process.request(kind.list_method(), None)),
        )
        .await;

        running
            .iter()
            .zip(responses)
            .filter_map(|(process, response)| {
                let server_id = process.id().to_string();
                match response {
                    Ok(response) => match response.outcome {
                        ResponseOutcome::Success(result) => Some(Listing {
                            items: extract_items(&server_id, kind, result),
                            server_id,
                        }),
                        ResponseOutcome::Failure(e) => {
                            error!(server = %server_id, method = kind.list_method(), error = %e, "Listing rejected by server");
                            None
                        }
                    },
                    Err(e) => {
                        error!(server = %server_id, method = kind.list_method(), error = %e, "Listing request failed");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Pull the descriptor array out of a listing result.
fn extract_items(server_id: &str, kind: CapabilityKind, mut result: Value) -> Vec<Value> {
    match result.get_mut(kind.result_key()).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(_) | None => {
            warn!(server = %server_id, key = kind.result_key(), "Listing result has no descriptor array");
            Vec::new()
        }
    }
}

/// Name to owner map; later listings override earlier ones.
fn build_routes(listings: &[Listing]) -> RouteTable {
    let mut table = RouteTable::new();
    for listing in listings {
        for tool in &listing.items {
            let Some(name) = tool.get("name").and_then(Value::as_str) else {
                debug!(server = %listing.server_id, "Skipping tool without a name");
                continue;
            };
            if let Some(previous) = table.insert(name.to_string(), listing.server_id.clone()) {
                if previous != listing.server_id {
                    warn!(
                        tool = %name,
                        previous = %previous,
                        server = %listing.server_id,
                        "Duplicate tool name, later server wins"
                    );
                }
            }
        }
    }
    table
}

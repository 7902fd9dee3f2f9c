// ABOUTME: Per-server configuration for a managed MCP process (command, env, restart policy)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Validation failures for server definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Server id cannot be empty")]
    EmptyId,

    #[error("Server '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("Server '{0}' has an empty executable name")]
    EmptyExecutable(String),

    #[error("Duplicate server id '{0}'")]
    DuplicateId(String),
}

/// Launcher family. Informational only: the argv is always taken verbatim from `command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Python,
    Npx,
    Uv,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Python => "python",
            Self::Npx => "npx",
            Self::Uv => "uv",
        };
        f.write_str(name)
    }
}

/// Definition of one MCP server the pool should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedProcessConfig {
    /// Unique key used for routing and status
    pub id: String,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub server_type: ServerType,

    /// Executable followed by leading arguments
    pub command: Vec<String>,

    /// Arguments appended after `command`
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Overrides applied on top of the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Startup timeout in seconds
    #[serde(default = "default_startup_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub restart_on_failure: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl ManagedProcessConfig {
    /// Enabled, restartable server with no extra args or env.
    pub fn new(id: impl Into<String>, server_type: ServerType, command: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            server_type,
            command,
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            timeout: default_startup_timeout(),
            restart_on_failure: true,
            enabled: true,
        }
    }

    /// Full argv: `command` followed by `args`.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.command
            .iter()
            .chain(self.args.iter())
            .map(String::as_str)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        match self.command.first() {
            None => Err(ConfigError::EmptyCommand(self.id.clone())),
            Some(program) if program.trim().is_empty() => {
                Err(ConfigError::EmptyExecutable(self.id.clone()))
            }
            Some(_) => Ok(()),
        }
    }
}

// ABOUTME: Configuration loading for mcp-hub
// Reads the TOML file holding pool tunables and managed server definitions

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod server;

pub use server::{ConfigError, ManagedProcessConfig, ServerType};

use crate::mcp_pool::PoolConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MCP_HUB_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pool tunables
    #[serde(default)]
    pub pool: PoolConfig,

    /// Managed MCP servers, in routing precedence order
    #[serde(default)]
    pub servers: Vec<ManagedProcessConfig>,
}

impl AppConfig {
    /// Load configuration from an explicit path or the default locations
    ///
    /// With no explicit path, the first existing file in
    /// [`Self::get_config_paths`] is used. No file at all yields the defaults
    /// with an empty server list.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a single configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        debug!(path = %path.display(), servers = config.servers.len(), "Configuration loaded");
        Ok(config)
    }

    /// Save configuration as pretty TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Check every server definition and reject duplicate ids
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::DuplicateId(server.id.clone()));
            }
        }
        Ok(())
    }

    /// Servers that should be started
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ManagedProcessConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Get configuration file paths in order of precedence
    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Explicit override
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                paths.push(PathBuf::from(path));
            }
        }

        // 2. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("mcp-hub.toml"));
        }

        // 3. User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mcp-hub").join("config.toml"));
        }

        // 4. System config
        paths.push(PathBuf::from("/etc/mcp-hub/config.toml"));

        paths
    }
}

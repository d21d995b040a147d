//! Configuration system for meshroute.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MESHROUTE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meshroute/config.toml
//!   3. ~/.config/meshroute/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::advert::Metric;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub agent: AgentConfig,
    pub routing: RoutingConfig,
    pub node_info: NodeInfoConfig,
    pub local: LocalRoutesConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent identity as 32 hex chars. Empty = random on every start.
    pub id: String,
    /// Name published in this agent's NodeInfo.
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Learned routes not refreshed within this many seconds are dropped.
    pub route_ttl_secs: u64,
    /// How often the staleness sweep runs.
    pub sweep_interval_secs: u64,
    /// How often local routes are re-advertised by the flooding layer.
    pub advertise_interval_secs: u64,
    /// Capacity of each route-event subscriber channel.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfoConfig {
    /// Management private key (64 hex chars). Empty = sealed NodeInfo is
    /// relayed but never opened on this agent.
    pub management_private_key: String,
}

/// Routes this agent originates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRoutesConfig {
    pub routes: Vec<LocalRoute>,
    pub domains: Vec<LocalDomain>,
    pub forwards: Vec<LocalForward>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRoute {
    /// CIDR, e.g. "10.0.0.0/8".
    pub prefix: String,
    #[serde(default)]
    pub metric: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDomain {
    /// Exact name or "*.example.com".
    pub pattern: String,
    #[serde(default)]
    pub metric: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalForward {
    /// Routing key other agents look up.
    pub key: String,
    /// host:port this agent dials for the key. Never advertised.
    pub target: String,
    #[serde(default)]
    pub metric: Metric,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            route_ttl_secs: 300,
            sweep_interval_secs: 30,
            advertise_interval_secs: 120,
            event_buffer: 256,
        }
    }
}

impl RoutingConfig {
    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn advertise_interval(&self) -> Duration {
        Duration::from_secs(self.advertise_interval_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshroute")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, falling back to defaults when it does not
    /// exist. Env overrides still apply.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            MeshConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML text. No env overrides.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHROUTE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeshConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MESHROUTE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESHROUTE_AGENT__ID") {
            self.agent.id = v;
        }
        if let Ok(v) = std::env::var("MESHROUTE_AGENT__DISPLAY_NAME") {
            self.agent.display_name = v;
        }
        if let Ok(v) = std::env::var("MESHROUTE_ROUTING__ROUTE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.routing.route_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("MESHROUTE_ROUTING__SWEEP_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.routing.sweep_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("MESHROUTE_ROUTING__EVENT_BUFFER") {
            if let Ok(n) = v.parse() {
                self.routing.event_buffer = n;
            }
        }
        if let Ok(v) = std::env::var("MESHROUTE_NODE_INFO__MANAGEMENT_PRIVATE_KEY") {
            self.node_info.management_private_key = v;
        }
    }
}

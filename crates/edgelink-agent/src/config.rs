//! Agent configuration loaded from TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use edgelink_types::{Edge, Screen, ScreenId, Topology, DEFAULT_EDGE_THRESHOLD};

use crate::error::AgentError;

/// Top-level configuration. Every field has a default so a missing config
/// file yields a runnable single-screen agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: NodeConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub screens: Vec<ScreenEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

/// Node identity and network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This host's name; also the name of the screen it owns.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Whether to run UDP broadcast discovery.
    #[serde(default = "default_true")]
    pub discovery: bool,
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
    /// Default tracing filter; `RUST_LOG` and `--verbose` take precedence.
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            control_port: default_control_port(),
            discovery_port: default_discovery_port(),
            bind: default_bind(),
            discovery: true,
            announce_interval_ms: default_announce_interval_ms(),
            log_filter: None,
        }
    }
}

/// Pointer state machine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    /// Width of the crossing hysteresis band, in pixels.
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: u32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            edge_threshold: default_edge_threshold(),
        }
    }
}

/// Control channel tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// How long delivery may stall behind a handoff barrier.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
    /// First reconnect delay after a connection loss.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Upper bound on the exponential reconnect delay.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            barrier_timeout_ms: default_barrier_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

/// One screen in the shared layout.
///
/// The entry whose name matches the node name describes the local screen;
/// entries with an address are statically configured peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenEntry {
    pub name: String,
    #[serde(default = "default_screen_width")]
    pub width: u32,
    #[serde(default = "default_screen_height")]
    pub height: u32,
    /// Control address of the owning host, `host:port` or bare `host`.
    #[serde(default)]
    pub address: Option<String>,
}

/// One edge link; the symmetric reverse edge is derived automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntry {
    pub from: String,
    pub edge: Edge,
    pub to: String,
}

impl AgentConfig {
    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file yields pure defaults; an unreadable or unparsable
    /// file is a fatal configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| AgentError::Config(format!("failed to read config: {e}")))?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| AgentError::Config(format!("failed to parse config: {e}")))?;
            info!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            info!("no config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Build the screen topology, returning it and the local screen's id.
    ///
    /// A node with no `[[screens]]` entry of its own gets a default-geometry
    /// screen named after it.
    pub fn build_topology(&self) -> Result<(Topology, ScreenId), AgentError> {
        let mut topology = Topology::new();
        let mut local = None;
        for entry in &self.screens {
            let id = topology.register_screen(Screen::new(&entry.name, entry.width, entry.height))?;
            if entry.name == self.agent.node_name {
                local = Some(id);
            }
        }
        let local = match local {
            Some(id) => id,
            None => topology.register_screen(Screen::new(
                &self.agent.node_name,
                default_screen_width(),
                default_screen_height(),
            ))?,
        };
        for link in &self.links {
            topology.connect(&link.from, link.edge, &link.to, link.edge.opposite())?;
        }
        Ok((topology, local))
    }

    /// Statically configured peers: screens that carry an address.
    ///
    /// Bare hostnames get the configured control port appended.
    pub fn static_peers(&self) -> Result<Vec<(String, SocketAddr)>, AgentError> {
        let mut peers = Vec::new();
        for entry in &self.screens {
            let Some(addr_str) = &entry.address else {
                continue;
            };
            let addr: SocketAddr = addr_str
                .parse()
                .or_else(|_| format!("{addr_str}:{}", self.agent.control_port).parse())
                .map_err(|e| AgentError::Config(format!("bad peer address {addr_str}: {e}")))?;
            peers.push((entry.name.clone(), addr));
        }
        Ok(peers)
    }

    #[must_use]
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.agent.announce_interval_ms)
    }

    #[must_use]
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.channel.barrier_timeout_ms)
    }

    #[must_use]
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.channel.reconnect_initial_ms)
    }

    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.channel.reconnect_max_ms)
    }
}

/// Default config file location: `$CONFIG_DIR/edgelink/config.toml`.
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("edgelink")
        .join("config.toml")
}

fn default_node_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "edgelink".to_string())
}

fn default_control_port() -> u16 {
    24800
}

fn default_discovery_port() -> u16 {
    24801
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_announce_interval_ms() -> u64 {
    1000
}

fn default_edge_threshold() -> u32 {
    DEFAULT_EDGE_THRESHOLD
}

fn default_barrier_timeout_ms() -> u64 {
    250
}

fn default_reconnect_initial_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    5000
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

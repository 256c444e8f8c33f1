//! Agent errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Bad or unreadable configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured screen layout violates a topology invariant.
    #[error("invalid topology: {0}")]
    Topology(#[from] edgelink_types::TopologyError),

    #[error("protocol error: {0}")]
    Protocol(#[from] edgelink_protocol::ProtocolError),

    #[error("input error: {0}")]
    Input(#[from] edgelink_input::InputError),

    #[error("discovery error: {0}")]
    Discovery(#[from] edgelink_discovery::DiscoveryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

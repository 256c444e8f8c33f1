//! Discovery subsystem errors.
//!
//! None of these are fatal to the agent: a host with broken discovery can
//! still reach statically configured peers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("broadcast send failed: {0}")]
    Send(std::io::Error),

    #[error("receive failed: {0}")]
    Recv(std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

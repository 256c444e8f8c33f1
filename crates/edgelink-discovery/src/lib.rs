//! Peer discovery for edgelink.
//!
//! Agents broadcast periodic announcements on a well-known UDP port and
//! track the announcements of others in a [`PeerRegistry`] with liveness
//! eviction. The socket layer sits behind [`DiscoveryTransport`] so a
//! multicast-DNS backend can be substituted without touching the registry
//! or sweep logic.

pub mod error;
pub mod registry;
pub mod service;
pub mod transport;

pub use error::DiscoveryError;
pub use registry::{PeerRecord, PeerRegistry};
pub use service::{DiscoveryEvent, DiscoveryHandle, DiscoveryService};
pub use transport::{Announcement, DiscoveryTransport, UdpBroadcast};

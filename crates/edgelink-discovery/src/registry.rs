//! Peer registry with liveness tracking.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;

/// A peer currently believed reachable.
///
/// Absence from the registry means "unreachable until rediscovered",
/// nothing stronger.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub node_name: String,
    pub address: IpAddr,
    pub control_port: u16,
    /// When the last announcement arrived.
    pub last_seen: Instant,
}

impl PeerRecord {
    /// The address to dial for a control channel.
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.control_port)
    }
}

/// All peers heard from recently, keyed by node name.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerRecord>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement, creating or refreshing the peer.
    ///
    /// Returns `true` when this announcement created a new record, which
    /// includes a peer re-admitted after eviction.
    pub fn observe(&mut self, node_name: &str, address: IpAddr, control_port: u16) -> bool {
        let now = Instant::now();
        match self.peers.get_mut(node_name) {
            Some(record) => {
                record.address = address;
                record.control_port = control_port;
                record.last_seen = now;
                false
            }
            None => {
                self.peers.insert(
                    node_name.to_string(),
                    PeerRecord {
                        node_name: node_name.to_string(),
                        address,
                        control_port,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Evict peers unheard from for longer than `ttl`, returning them.
    pub fn sweep(&mut self, ttl: Duration) -> Vec<PeerRecord> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .peers
            .values()
            .filter(|record| now.duration_since(record.last_seen) > ttl)
            .map(|record| record.node_name.clone())
            .collect();
        stale
            .iter()
            .filter_map(|name| self.peers.remove(name))
            .collect()
    }

    #[must_use]
    pub fn get(&self, node_name: &str) -> Option<&PeerRecord> {
        self.peers.get(node_name)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(192, 168, 1, 20));

    #[test]
    fn observe_reports_new_then_refresh() {
        let mut registry = PeerRegistry::new();
        assert!(registry.observe("laptop", ADDR, 24800));
        assert!(!registry.observe("laptop", ADDR, 24800));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn observe_updates_address_on_refresh() {
        let mut registry = PeerRegistry::new();
        registry.observe("laptop", ADDR, 24800);

        let moved = IpAddr::V4(std::net::Ipv4Addr::new(192, 168, 1, 99));
        assert!(!registry.observe("laptop", moved, 24801));

        let record = registry.get("laptop").unwrap();
        assert_eq!(record.address, moved);
        assert_eq!(record.control_port, 24801);
        assert_eq!(record.control_addr(), "192.168.1.99:24801".parse().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_stale_peers() {
        let mut registry = PeerRegistry::new();
        registry.observe("old", ADDR, 24800);

        tokio::time::advance(Duration::from_secs(10)).await;
        registry.observe("fresh", ADDR, 24800);

        let evicted = registry.sweep(Duration::from_secs(6));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].node_name, "old");
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_peer_is_readmitted_as_new() {
        let mut registry = PeerRegistry::new();
        registry.observe("laptop", ADDR, 24800);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(registry.sweep(Duration::from_secs(6)).len(), 1);

        // Next announce re-admits it as a brand-new peer.
        assert!(registry.observe("laptop", ADDR, 24800));
    }
}

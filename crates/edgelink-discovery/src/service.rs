//! The discovery service: announce, listen, and sweep loops.
//!
//! One task drives all three concerns over a single transport. Peers move
//! through Unknown -> Alive (first announcement heard) -> Stale (evicted by
//! the liveness sweep); re-admission after eviction is reported as a fresh
//! [`DiscoveryEvent::PeerFound`].

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{PeerRecord, PeerRegistry};
use crate::transport::{Announcement, DiscoveryTransport};

/// Peers are evicted after missing this many announce intervals.
const LIVENESS_FACTOR: u32 = 3;

/// Changes in the set of reachable peers.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A peer announced itself for the first time, or after eviction.
    PeerFound(PeerRecord),
    /// A peer went silent past the liveness timeout.
    PeerLost(String),
}

/// Periodically announces this host and tracks announcements from others.
pub struct DiscoveryService<T> {
    transport: T,
    announcement: Announcement,
    announce_interval: Duration,
}

impl<T: DiscoveryTransport> DiscoveryService<T> {
    pub fn new(
        transport: T,
        node_name: impl Into<String>,
        control_port: u16,
        announce_interval: Duration,
    ) -> Self {
        Self {
            transport,
            announcement: Announcement {
                node_name: node_name.into(),
                control_port,
            },
            announce_interval,
        }
    }

    /// How long a peer may stay silent before it is evicted.
    #[must_use]
    pub fn liveness_timeout(&self) -> Duration {
        self.announce_interval * LIVENESS_FACTOR
    }

    /// Start the service task.
    ///
    /// Returns a handle for stopping it and the stream of peer changes.
    #[must_use]
    pub fn spawn(self) -> (DiscoveryHandle, mpsc::Receiver<DiscoveryEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(event_tx, stop_rx));
        (
            DiscoveryHandle {
                stop: stop_tx,
                task,
            },
            event_rx,
        )
    }

    async fn run(self, events: mpsc::Sender<DiscoveryEvent>, mut stop: watch::Receiver<bool>) {
        let ttl = self.liveness_timeout();
        let mut registry = PeerRegistry::new();
        let mut announce = tokio::time::interval(self.announce_interval);
        announce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            node = %self.announcement.node_name,
            control_port = self.announcement.control_port,
            "discovery service running"
        );

        loop {
            tokio::select! {
                _ = announce.tick() => {
                    if let Err(e) = self.transport.announce(&self.announcement).await {
                        warn!(error = %e, "discovery announce failed");
                    }
                    for record in registry.sweep(ttl) {
                        info!(peer = %record.node_name, "peer went silent, evicting");
                        if events
                            .send(DiscoveryEvent::PeerLost(record.node_name))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                result = self.transport.recv() => match result {
                    Ok((heard, src)) => {
                        if heard.node_name == self.announcement.node_name {
                            continue;
                        }
                        debug!(peer = %heard.node_name, %src, "announcement heard");
                        let is_new =
                            registry.observe(&heard.node_name, src.ip(), heard.control_port);
                        if is_new {
                            let Some(record) = registry.get(&heard.node_name).cloned() else {
                                continue;
                            };
                            info!(
                                peer = %record.node_name,
                                addr = %record.control_addr(),
                                "peer discovered"
                            );
                            if events.send(DiscoveryEvent::PeerFound(record)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "discovery receive failed");
                        tokio::time::sleep(self.announce_interval).await;
                    }
                },
                _ = stop.changed() => {
                    info!("discovery service stopping");
                    return;
                }
            }
        }
    }
}

/// Owner handle for a running [`DiscoveryService`] task.
pub struct DiscoveryHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Signal the service to stop and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

//! The agent event loop.
//!
//! A single task owns the cursor tracker, the topology, and all peer
//! sessions. Capture, connection readers, discovery, and dial/reconnect
//! tasks communicate with it exclusively through the [`AgentEvent`] queue,
//! so no shared state needs locking.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use edgelink_discovery::{DiscoveryEvent, DiscoveryHandle, DiscoveryService, UdpBroadcast};
use edgelink_input::{InjectionSink, PointerSource};
use edgelink_protocol::{ControlListener, MessageReceiver, ReceiveSequencer};
use edgelink_types::{
    ControlMessage, CursorTracker, EdgeTransition, InputEvent, Screen, ScreenId, Topology,
};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::session::PeerSession;

/// How often stalled handoff barriers are checked for expiry.
const BARRIER_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// Externally visible agent state, published on a watch channel after
/// every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    /// Name of the screen that currently owns the shared cursor.
    pub active_screen: String,
    /// Number of established peer sessions.
    pub session_count: usize,
    /// The peer receiving forwarded local input, if the cursor is away.
    pub forwarding_to: Option<String>,
}

/// Events processed by the agent's main loop.
pub enum AgentEvent {
    /// A locally captured pointer event.
    LocalInput(InputEvent),
    /// A decoded message from an established peer.
    PeerMessage { peer: String, msg: ControlMessage },
    /// A freshly handshaken session, dialed or accepted.
    SessionReady {
        session: PeerSession,
        receiver: MessageReceiver,
    },
    /// A peer connection was lost.
    SessionLost(String),
    /// A change in the discovered peer set.
    Discovery(DiscoveryEvent),
    /// Stop the agent.
    Shutdown,
}

/// The edgelink peer agent.
pub struct Agent {
    config: AgentConfig,
    topology: Topology,
    local: ScreenId,
    screen: Screen,
    cursor: CursorTracker,
    sink: Box<dyn InjectionSink>,
    source: Box<dyn PointerSource>,
    listener: ControlListener,
    static_peers: Vec<(String, SocketAddr)>,
    sessions: HashMap<String, PeerSession>,
    sequencers: HashMap<String, ReceiveSequencer>,
    forwarding_to: Option<String>,
    event_tx: mpsc::Sender<AgentEvent>,
    event_rx: mpsc::Receiver<AgentEvent>,
    status_tx: watch::Sender<AgentStatus>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("local", &self.local)
            .field("forwarding_to", &self.forwarding_to)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Validate the configuration and bind the control listener.
    ///
    /// Topology violations, malformed peer addresses, and an unbindable
    /// control port are fatal here; everything later is recovered at
    /// runtime.
    pub async fn bind(
        config: AgentConfig,
        sink: Box<dyn InjectionSink>,
        source: Box<dyn PointerSource>,
    ) -> Result<Self, AgentError> {
        let (topology, local) = config.build_topology()?;
        let screen = topology
            .screen(local)
            .cloned()
            .ok_or_else(|| AgentError::Config("local screen missing from topology".to_string()))?;

        let mut cursor = CursorTracker::new(local, config.pointer.edge_threshold);
        cursor.warp(local, screen.max_x() / 2, screen.max_y() / 2);

        let bind_addr: SocketAddr = format!("{}:{}", config.agent.bind, config.agent.control_port)
            .parse()
            .map_err(|e| AgentError::Config(format!("bad bind address {}: {e}", config.agent.bind)))?;
        let listener = ControlListener::bind(bind_addr).await?;
        let static_peers = config.static_peers()?;

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (status_tx, _) = watch::channel(AgentStatus {
            active_screen: config.agent.node_name.clone(),
            session_count: 0,
            forwarding_to: None,
        });

        Ok(Self {
            config,
            topology,
            local,
            screen,
            cursor,
            sink,
            source,
            listener,
            static_peers,
            sessions: HashMap::new(),
            sequencers: HashMap::new(),
            forwarding_to: None,
            event_tx,
            event_rx,
            status_tx,
        })
    }

    /// The bound control address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, AgentError> {
        Ok(self.listener.local_addr()?)
    }

    /// A sender for feeding events into the agent, including `Shutdown`.
    pub fn event_sender(&self) -> mpsc::Sender<AgentEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    /// Run the agent until `Shutdown` is received.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        // Local capture feeds the event queue.
        let (capture_tx, mut capture_rx) = mpsc::channel::<InputEvent>(1024);
        self.source.start(capture_tx).await?;
        let forward_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = capture_rx.recv().await {
                if forward_tx.send(AgentEvent::LocalInput(event)).await.is_err() {
                    break;
                }
            }
        });

        let discovery = self.start_discovery().await;

        for (name, addr) in std::mem::take(&mut self.static_peers) {
            info!(peer = %name, %addr, "dialing configured peer");
            self.spawn_dial(addr);
        }

        info!(
            addr = %self.local_addr()?,
            node = %self.config.agent.node_name,
            "agent running"
        );
        self.publish_status();

        let mut barrier_sweep = tokio::time::interval(BARRIER_SWEEP_INTERVAL);
        barrier_sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((sender, receiver, remote)) => {
                        debug!(%remote, "incoming control connection");
                        let tx = self.event_tx.clone();
                        let name = self.config.agent.node_name.clone();
                        let screen = self.screen.clone();
                        tokio::spawn(async move {
                            match PeerSession::accept(sender, receiver, &name, &screen).await {
                                Ok((session, receiver)) => {
                                    let _ = tx
                                        .send(AgentEvent::SessionReady { session, receiver })
                                        .await;
                                }
                                Err(e) => warn!(error = %e, "inbound handshake failed"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = barrier_sweep.tick() => {
                    let mut flushed = Vec::new();
                    for sequencer in self.sequencers.values_mut() {
                        flushed.extend(sequencer.release_expired());
                    }
                    for event in flushed {
                        self.apply_remote(event.event).await;
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(AgentEvent::Shutdown) | None => break,
                        Some(event) => self.handle_event(event).await,
                    }
                }
            }
        }

        // Shutdown: nothing below starts a new sink call once the loop has
        // exited, and readers/dialers unwind when the queue closes.
        info!("agent stopping");
        if let Some(handle) = discovery {
            handle.stop().await;
        }
        let _ = self.source.shutdown().await;
        for (_, session) in self.sessions.drain() {
            session.bye().await;
        }
        self.sequencers.clear();
        self.sink.shutdown().await?;
        info!("agent stopped");
        Ok(())
    }

    async fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::LocalInput(event) => self.handle_local_input(event).await,
            AgentEvent::PeerMessage { peer, msg } => self.handle_peer_message(peer, msg).await,
            AgentEvent::SessionReady { session, receiver } => {
                self.handle_session_ready(session, receiver).await;
            }
            AgentEvent::SessionLost(peer) => self.handle_session_lost(peer),
            AgentEvent::Discovery(event) => self.handle_discovery(event),
            AgentEvent::Shutdown => {}
        }
    }

    async fn handle_local_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::Move { dx, dy } => {
                if let Some(transition) = self.cursor.apply_delta(&self.topology, dx, dy) {
                    self.handle_transition(transition).await;
                } else if let Some(peer) = self.forwarding_to.clone() {
                    self.forward_to(&peer, InputEvent::Move { dx, dy }).await;
                }
            }
            InputEvent::Button { .. } | InputEvent::Wheel { .. } => {
                if let Some(peer) = self.forwarding_to.clone() {
                    self.forward_to(&peer, event).await;
                }
            }
            InputEvent::EdgeCross { .. } => {
                debug!("ignoring handoff event from local capture");
            }
        }
    }

    /// The local cursor crossed an edge: hand ownership to the neighbor
    /// and tell both affected peers.
    async fn handle_transition(&mut self, transition: EdgeTransition) {
        let from = name_of(&self.topology, transition.from);
        let to = name_of(&self.topology, transition.to);
        info!(
            %from,
            %to,
            edge = %transition.edge,
            x = transition.entry_x,
            y = transition.entry_y,
            "cursor handoff"
        );

        let event = InputEvent::EdgeCross {
            from_screen: from.clone(),
            to_screen: to.clone(),
            entry_x: transition.entry_x,
            entry_y: transition.entry_y,
        };
        for peer in [from, to] {
            if peer != self.config.agent.node_name && self.sessions.contains_key(&peer) {
                self.forward_to(&peer, event.clone()).await;
            }
        }

        self.refresh_forwarding();
        self.publish_status();
    }

    async fn handle_peer_message(&mut self, peer: String, msg: ControlMessage) {
        match msg {
            ControlMessage::Event(event) => {
                let released = match self.sequencers.get_mut(&peer) {
                    Some(sequencer) => sequencer.accept(event),
                    None => {
                        debug!(peer = %peer, "event from unknown session");
                        return;
                    }
                };
                for event in released {
                    self.apply_remote(event.event).await;
                }
            }
            ControlMessage::ActiveScreen { screen_name } => {
                info!(peer = %peer, screen = %screen_name, "active-screen resync");
                if let Some(id) = self.topology.find(&screen_name) {
                    if let Some(screen) = self.topology.screen(id) {
                        // Carry the position over, clamped to the new
                        // screen's bounds.
                        let (x, y) = self.cursor.position();
                        let (x, y) = screen.clamp(x, y);
                        self.cursor.warp(id, x, y);
                    }
                }
                self.refresh_forwarding();
                self.publish_status();
            }
            ControlMessage::Bye => {
                info!(peer = %peer, "peer said goodbye");
                self.sessions.remove(&peer);
                self.sequencers.remove(&peer);
                if self.active_screen_name() == peer {
                    self.reclaim_cursor();
                }
                self.refresh_forwarding();
                self.publish_status();
            }
            ControlMessage::Hello { .. } | ControlMessage::Welcome { .. } => {
                warn!(peer = %peer, "unexpected handshake message on established session");
            }
        }
    }

    /// Apply one delivered remote event to the local host.
    async fn apply_remote(&mut self, event: InputEvent) {
        let result = match event {
            InputEvent::Move { dx, dy } => self.sink.move_relative(dx, dy).await,
            InputEvent::Button { button, pressed } => {
                self.sink.set_button(button, pressed).await
            }
            InputEvent::Wheel { delta } => self.sink.scroll(delta).await,
            InputEvent::EdgeCross {
                from_screen,
                to_screen,
                entry_x,
                entry_y,
            } => {
                debug!(%from_screen, %to_screen, entry_x, entry_y, "remote handoff");
                if to_screen == self.config.agent.node_name {
                    // The cursor entered our screen: take ownership and
                    // place it at the remapped entry point.
                    self.cursor.warp(self.local, entry_x, entry_y);
                    self.refresh_forwarding();
                    self.publish_status();
                    self.sink.move_absolute(entry_x, entry_y).await
                } else {
                    // Ownership moved elsewhere; track it if we know the
                    // screen.
                    if let Some(id) = self.topology.find(&to_screen) {
                        self.cursor.warp(id, entry_x, entry_y);
                    }
                    self.refresh_forwarding();
                    self.publish_status();
                    Ok(())
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "injection failed");
        }
    }

    async fn handle_session_ready(&mut self, mut session: PeerSession, receiver: MessageReceiver) {
        let peer = session.node_name.clone();
        if self.sessions.contains_key(&peer) {
            debug!(peer = %peer, "duplicate session, dropping new connection");
            session.bye().await;
            return;
        }

        // A discovered peer may not appear in the static layout; register
        // its screen so handoff names resolve. Edge links still only come
        // from configuration.
        if self.topology.find(&session.screen.name).is_none() {
            if let Err(e) = self.topology.register_screen(session.screen.clone()) {
                warn!(peer = %peer, error = %e, "cannot register peer screen");
            }
        }

        if session.addr.is_some() {
            // Dialing side announces ownership so both ends resume from an
            // agreed active screen, including after a reconnect.
            let active = self.active_screen_name();
            if let Err(e) = session.announce_active(&active).await {
                warn!(peer = %peer, error = %e, "resync announce failed");
                return;
            }
        }

        self.sequencers.insert(
            peer.clone(),
            ReceiveSequencer::new(self.config.barrier_timeout()),
        );
        self.spawn_reader(peer.clone(), receiver);
        self.sessions.insert(peer.clone(), session);
        info!(peer = %peer, "session established");
        self.refresh_forwarding();
        self.publish_status();
    }

    fn handle_session_lost(&mut self, peer: String) {
        let Some(session) = self.sessions.remove(&peer) else {
            return;
        };
        self.sequencers.remove(&peer);
        warn!(peer = %peer, "session lost");

        if self.active_screen_name() == peer {
            // The owner of the active screen is unreachable: reclaim the
            // cursor locally rather than forwarding into the void.
            self.reclaim_cursor();
        }

        if let Some(addr) = session.addr {
            info!(peer = %peer, %addr, "scheduling reconnect");
            self.spawn_dial(addr);
        }

        self.refresh_forwarding();
        self.publish_status();
    }

    fn handle_discovery(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::PeerFound(record) => {
                if self.sessions.contains_key(&record.node_name) {
                    return;
                }
                // The lexically lower name dials; the other side accepts.
                // Avoids crossed connections when both hear each other.
                if self.config.agent.node_name < record.node_name {
                    info!(peer = %record.node_name, addr = %record.control_addr(), "dialing discovered peer");
                    self.spawn_dial(record.control_addr());
                } else {
                    debug!(peer = %record.node_name, "waiting for discovered peer to dial us");
                }
            }
            DiscoveryEvent::PeerLost(name) => {
                debug!(peer = %name, "peer dropped from discovery registry");
            }
        }
    }

    async fn forward_to(&mut self, peer: &str, event: InputEvent) {
        let Some(session) = self.sessions.get_mut(peer) else {
            debug!(peer = %peer, "no session for forwarding target");
            return;
        };
        if let Err(e) = session.send_event(event).await {
            warn!(peer = %peer, error = %e, "forwarding failed");
            // The reader task will also notice the broken connection; this
            // only accelerates the cleanup.
            let _ = self.event_tx.try_send(AgentEvent::SessionLost(peer.to_string()));
        }
    }

    async fn start_discovery(&self) -> Option<DiscoveryHandle> {
        if !self.config.agent.discovery {
            return None;
        }
        let transport = match UdpBroadcast::bind(self.config.agent.discovery_port).await {
            Ok(transport) => transport,
            Err(e) => {
                // Non-fatal: statically configured peers still work.
                warn!(error = %e, "discovery unavailable, continuing without it");
                return None;
            }
        };
        let control_port = self
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.config.agent.control_port);
        let service = DiscoveryService::new(
            transport,
            self.config.agent.node_name.clone(),
            control_port,
            self.config.announce_interval(),
        );
        let (handle, mut events) = service.spawn();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(AgentEvent::Discovery(event)).await.is_err() {
                    break;
                }
            }
        });
        Some(handle)
    }

    /// Read messages from one peer connection into the event queue.
    fn spawn_reader(&self, peer: String, mut receiver: MessageReceiver) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv::<ControlMessage>().await {
                    Ok(Some(msg)) => {
                        let event = AgentEvent::PeerMessage {
                            peer: peer.clone(),
                            msg,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "control channel failed");
                        break;
                    }
                }
            }
            let _ = tx.send(AgentEvent::SessionLost(peer)).await;
        });
    }

    /// Dial a peer until it answers, with capped exponential backoff.
    fn spawn_dial(&self, addr: SocketAddr) {
        let tx = self.event_tx.clone();
        let name = self.config.agent.node_name.clone();
        let screen = self.screen.clone();
        let initial = self.config.reconnect_initial();
        let max = self.config.reconnect_max();
        tokio::spawn(async move {
            let mut delay = initial;
            loop {
                match PeerSession::dial(addr, &name, &screen).await {
                    Ok((session, receiver)) => {
                        let _ = tx.send(AgentEvent::SessionReady { session, receiver }).await;
                        return;
                    }
                    Err(e) => {
                        debug!(%addr, error = %e, delay = ?delay, "dial failed, retrying");
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(max);
                        if tx.is_closed() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Pull the cursor back onto the local screen at its last position,
    /// clamped to local bounds.
    fn reclaim_cursor(&mut self) {
        let (x, y) = self.cursor.position();
        let (x, y) = self.screen.clamp(x, y);
        self.cursor.warp(self.local, x, y);
    }

    fn active_screen_name(&self) -> String {
        name_of(&self.topology, self.cursor.active_screen())
    }

    /// Local input forwards to the active screen's owner, when that screen
    /// is remote and its session is up.
    fn refresh_forwarding(&mut self) {
        let active = self.active_screen_name();
        self.forwarding_to = (active != self.config.agent.node_name)
            .then_some(active)
            .filter(|name| self.sessions.contains_key(name));
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(AgentStatus {
            active_screen: self.active_screen_name(),
            session_count: self.sessions.len(),
            forwarding_to: self.forwarding_to.clone(),
        });
    }
}

fn name_of(topology: &Topology, id: ScreenId) -> String {
    topology.name_of(id).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkEntry, NodeConfig, ScreenEntry};
    use edgelink_input::{NoopSink, NullSource};
    use edgelink_types::Edge;

    fn layout_config() -> AgentConfig {
        AgentConfig {
            agent: NodeConfig {
                node_name: "a".to_string(),
                control_port: 0,
                bind: "127.0.0.1".to_string(),
                discovery: false,
                ..NodeConfig::default()
            },
            screens: vec![
                ScreenEntry {
                    name: "a".to_string(),
                    width: 1920,
                    height: 1080,
                    address: None,
                },
                ScreenEntry {
                    name: "b".to_string(),
                    width: 1280,
                    height: 720,
                    address: None,
                },
            ],
            links: vec![LinkEntry {
                from: "a".to_string(),
                edge: Edge::Right,
                to: "b".to_string(),
            }],
            ..AgentConfig::default()
        }
    }

    async fn bind_agent(config: AgentConfig) -> Result<Agent, AgentError> {
        Agent::bind(config, Box::new(NoopSink::new()), Box::new(NullSource::new())).await
    }

    #[tokio::test]
    async fn malformed_peer_address_is_rejected_at_bind() {
        let mut config = layout_config();
        config.screens[1].address = Some("not an address".to_string());
        let err = bind_agent(config).await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn resync_clamps_position_to_target_screen() {
        let mut agent = bind_agent(layout_config()).await.unwrap();
        // Position valid on the local 1920x1080 screen but outside b's
        // 1280x720 bounds.
        agent.cursor.warp(agent.local, 1900, 1000);

        agent
            .handle_peer_message(
                "b".to_string(),
                ControlMessage::ActiveScreen {
                    screen_name: "b".to_string(),
                },
            )
            .await;

        assert_eq!(
            agent.cursor.active_screen(),
            agent.topology.find("b").unwrap()
        );
        assert_eq!(agent.cursor.position(), (1280, 720));
    }

    #[tokio::test]
    async fn resync_to_unknown_screen_keeps_local_ownership() {
        let mut agent = bind_agent(layout_config()).await.unwrap();

        agent
            .handle_peer_message(
                "b".to_string(),
                ControlMessage::ActiveScreen {
                    screen_name: "ghost".to_string(),
                },
            )
            .await;

        assert_eq!(agent.cursor.active_screen(), agent.local);
        assert_eq!(agent.forwarding_to, None);
    }
}

//! Peer sessions: handshake, event stamping, resync.

use std::net::SocketAddr;

use tracing::{debug, info};

use edgelink_protocol::{connect, MessageReceiver, MessageSender, ProtocolError, SendSequence};
use edgelink_types::{
    ControlMessage, InputEvent, ProtocolVersion, Screen, PROTOCOL_VERSION,
};

use crate::error::AgentError;

/// An established control-channel session with one peer.
///
/// Owns the send half and the outbound sequence counter; the receive half
/// is handed to a reader task after the handshake.
#[derive(Debug)]
pub struct PeerSession {
    /// The remote host's node name.
    pub node_name: String,
    /// The screen the remote host owns.
    pub screen: Screen,
    /// Redial target when this side initiated the connection.
    pub addr: Option<SocketAddr>,
    sender: MessageSender,
    sequence: SendSequence,
}

impl PeerSession {
    /// Dial a peer and run the initiator side of the handshake:
    /// send `Hello`, expect `Welcome`.
    pub async fn dial(
        addr: SocketAddr,
        local_name: &str,
        local_screen: &Screen,
    ) -> Result<(Self, MessageReceiver), AgentError> {
        let (mut sender, mut receiver) = connect(addr).await?;
        sender
            .send(&ControlMessage::Hello {
                version: PROTOCOL_VERSION,
                node_name: local_name.to_string(),
                screen: local_screen.clone(),
            })
            .await?;
        debug!(%addr, "sent Hello");

        let welcome: ControlMessage = receiver.recv().await?.ok_or_else(|| {
            ProtocolError::Handshake("connection closed before Welcome".to_string())
        })?;
        match welcome {
            ControlMessage::Welcome {
                version,
                node_name,
                screen,
            } => {
                verify_version(version)?;
                info!(peer = %node_name, %addr, "handshake complete (initiator)");
                Ok((
                    Self {
                        node_name,
                        screen,
                        addr: Some(addr),
                        sender,
                        sequence: SendSequence::new(),
                    },
                    receiver,
                ))
            }
            other => Err(ProtocolError::Handshake(format!("expected Welcome, got {other:?}")).into()),
        }
    }

    /// Run the responder side of the handshake on an accepted connection:
    /// expect `Hello`, reply `Welcome`.
    pub async fn accept(
        mut sender: MessageSender,
        mut receiver: MessageReceiver,
        local_name: &str,
        local_screen: &Screen,
    ) -> Result<(Self, MessageReceiver), AgentError> {
        let hello: ControlMessage = receiver
            .recv()
            .await?
            .ok_or_else(|| ProtocolError::Handshake("connection closed before Hello".to_string()))?;
        match hello {
            ControlMessage::Hello {
                version,
                node_name,
                screen,
            } => {
                verify_version(version)?;
                sender
                    .send(&ControlMessage::Welcome {
                        version: PROTOCOL_VERSION,
                        node_name: local_name.to_string(),
                        screen: local_screen.clone(),
                    })
                    .await?;
                info!(peer = %node_name, "handshake complete (responder)");
                Ok((
                    Self {
                        node_name,
                        screen,
                        addr: None,
                        sender,
                        sequence: SendSequence::new(),
                    },
                    receiver,
                ))
            }
            other => Err(ProtocolError::Handshake(format!("expected Hello, got {other:?}")).into()),
        }
    }

    /// Stamp an event with the next sequence number and send it.
    pub async fn send_event(&mut self, event: InputEvent) -> Result<(), AgentError> {
        let stamped = self.sequence.stamp(event);
        self.sender.send(&ControlMessage::Event(stamped)).await?;
        Ok(())
    }

    /// Announce which screen currently owns the shared cursor.
    ///
    /// Sent by the dialing side right after the handshake, and again after
    /// every reconnect, so both sides resume from agreed ownership.
    pub async fn announce_active(&mut self, screen_name: &str) -> Result<(), AgentError> {
        self.sender
            .send(&ControlMessage::ActiveScreen {
                screen_name: screen_name.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Send `Bye` and close the send half. Best-effort; the peer may
    /// already be gone.
    pub async fn bye(mut self) {
        let _ = self.sender.send(&ControlMessage::Bye).await;
        let _ = self.sender.finish().await;
    }
}

fn verify_version(remote: ProtocolVersion) -> Result<(), ProtocolError> {
    if remote.is_compatible(PROTOCOL_VERSION) {
        Ok(())
    } else {
        Err(ProtocolError::VersionMismatch {
            remote: remote.to_string(),
            local: PROTOCOL_VERSION.to_string(),
        })
    }
}

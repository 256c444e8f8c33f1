//! Discovery wire transport.
//!
//! The default transport broadcasts bincode-encoded announcements over
//! UDP. The trait boundary keeps the registry and liveness logic unaware
//! of the socket layer, so a multicast-DNS transport can be substituted
//! later.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use bincode::{Decode, Encode};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::DiscoveryError;

/// The payload every agent broadcasts periodically.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Announcement {
    pub node_name: String,
    pub control_port: u16,
}

/// Encode an announcement for the wire.
pub fn encode_announcement(announcement: &Announcement) -> Result<Vec<u8>, DiscoveryError> {
    bincode::encode_to_vec(announcement, bincode::config::standard())
        .map_err(|e| DiscoveryError::Other(anyhow::anyhow!("encode announcement: {e}")))
}

/// Decode a datagram, requiring it to be exactly one announcement.
#[must_use]
pub fn decode_announcement(datagram: &[u8]) -> Option<Announcement> {
    let (announcement, consumed) =
        bincode::decode_from_slice(datagram, bincode::config::standard()).ok()?;
    (consumed == datagram.len()).then_some(announcement)
}

/// Sends and receives announcements on behalf of the discovery service.
///
/// Both operations take `&self` so the service can broadcast and listen on
/// the same transport from one task.
#[async_trait]
pub trait DiscoveryTransport: Send + Sync + 'static {
    /// Broadcast one announcement to the local network.
    async fn announce(&self, announcement: &Announcement) -> Result<(), DiscoveryError>;

    /// Wait for the next well-formed announcement from any host.
    async fn recv(&self) -> Result<(Announcement, SocketAddr), DiscoveryError>;
}

/// UDP broadcast transport on a well-known port.
///
/// One socket both broadcasts and listens; the service filters out the
/// announcements this host hears from itself.
pub struct UdpBroadcast {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpBroadcast {
    /// Bind the discovery socket and enable broadcast.
    pub async fn bind(port: u16) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| DiscoveryError::Bind { port, source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| DiscoveryError::Bind { port, source })?;
        let bound_port = socket
            .local_addr()
            .map_err(|source| DiscoveryError::Bind { port, source })?
            .port();
        Ok(Self {
            socket,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, bound_port)),
        })
    }

    /// The locally bound port (useful with port 0).
    pub fn local_port(&self) -> Result<u16, DiscoveryError> {
        self.socket
            .local_addr()
            .map(|addr| addr.port())
            .map_err(DiscoveryError::Recv)
    }
}

#[async_trait]
impl DiscoveryTransport for UdpBroadcast {
    async fn announce(&self, announcement: &Announcement) -> Result<(), DiscoveryError> {
        let payload = encode_announcement(announcement)?;
        self.socket
            .send_to(&payload, self.target)
            .await
            .map_err(DiscoveryError::Send)?;
        Ok(())
    }

    async fn recv(&self) -> Result<(Announcement, SocketAddr), DiscoveryError> {
        let mut buf = vec![0u8; 2048];
        loop {
            let (len, src) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(DiscoveryError::Recv)?;
            match decode_announcement(&buf[..len]) {
                Some(announcement) => return Ok((announcement, src)),
                None => debug!(%src, len, "ignoring undecodable discovery datagram"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_roundtrip() {
        let announcement = Announcement {
            node_name: "desk".to_string(),
            control_port: 24800,
        };
        let bytes = encode_announcement(&announcement).unwrap();
        assert_eq!(decode_announcement(&bytes), Some(announcement));
    }

    #[test]
    fn garbage_datagram_is_ignored() {
        assert_eq!(decode_announcement(&[0xFF, 0xFE, 0xFD]), None);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = encode_announcement(&Announcement {
            node_name: "desk".to_string(),
            control_port: 24800,
        })
        .unwrap();
        bytes.push(0);
        assert_eq!(decode_announcement(&bytes), None);
    }

    #[tokio::test]
    async fn udp_transport_receives_datagrams() {
        let transport = UdpBroadcast::bind(0).await.unwrap();
        let port = transport.local_port().unwrap();

        let announcement = Announcement {
            node_name: "laptop".to_string(),
            control_port: 24800,
        };
        let payload = encode_announcement(&announcement).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Junk first; the receiver must skip it and deliver the real one.
        sender
            .send_to(&[1, 2, 3], ("127.0.0.1", port))
            .await
            .unwrap();
        sender
            .send_to(&payload, ("127.0.0.1", port))
            .await
            .unwrap();

        let (received, src) = transport.recv().await.unwrap();
        assert_eq!(received, announcement);
        assert_eq!(src.ip(), sender.local_addr().unwrap().ip());
    }
}

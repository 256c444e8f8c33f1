//! Control channel: framed messages over a TCP stream.
//!
//! One channel per peer pair. The stream is split so the agent can keep
//! the send half while a reader task drives the receive half.

use std::net::SocketAddr;

use bincode::{Decode, Encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::trace;

use crate::error::{DecodeError, ProtocolError};
use crate::wire::MAX_MESSAGE_SIZE;

/// Listens for incoming control connections.
pub struct ControlListener {
    listener: TcpListener,
}

impl ControlListener {
    /// Bind the control listener.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("bind {addr}: {e}")))?;
        Ok(Self { listener })
    }

    /// The locally bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        self.listener
            .local_addr()
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }

    /// Accept one peer connection, returning the framed halves.
    pub async fn accept(
        &self,
    ) -> Result<(MessageSender, MessageReceiver, SocketAddr), ProtocolError> {
        let (stream, remote) = self
            .listener
            .accept()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        let (sender, receiver) = split_stream(stream)?;
        Ok((sender, receiver, remote))
    }
}

/// Dial a remote control listener.
pub async fn connect(addr: SocketAddr) -> Result<(MessageSender, MessageReceiver), ProtocolError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ProtocolError::Connection(format!("connect {addr}: {e}")))?;
    split_stream(stream)
}

fn split_stream(stream: TcpStream) -> Result<(MessageSender, MessageReceiver), ProtocolError> {
    stream
        .set_nodelay(true)
        .map_err(|e| ProtocolError::Connection(e.to_string()))?;
    let (read, write) = stream.into_split();
    Ok((MessageSender::new(write), MessageReceiver::new(read)))
}

/// Sends length-prefixed bincode messages over the write half.
#[derive(Debug)]
pub struct MessageSender {
    stream: OwnedWriteHalf,
}

impl MessageSender {
    fn new(stream: OwnedWriteHalf) -> Self {
        Self { stream }
    }

    /// Send a message, encoding it as length-prefixed bincode.
    pub async fn send<T: Encode>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let frame = crate::wire::encode_message(msg)?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        trace!(len = frame.len(), "sent message");
        Ok(())
    }

    /// Signal no more data; the peer's receiver observes a clean close.
    pub async fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }
}

/// Receives length-prefixed bincode messages from the read half.
#[derive(Debug)]
pub struct MessageReceiver {
    stream: OwnedReadHalf,
}

impl MessageReceiver {
    fn new(stream: OwnedReadHalf) -> Self {
        Self { stream }
    }

    /// Receive and decode a message.
    ///
    /// Returns `None` if the stream has been cleanly closed by the peer.
    /// A close in the middle of a frame is a truncated frame, not a clean
    /// shutdown.
    pub async fn recv<T: Decode<()>>(&mut self) -> Result<Option<T>, ProtocolError> {
        // Read 4-byte length prefix
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_MESSAGE_SIZE {
            return Err(DecodeError::BadLength.into());
        }

        let mut payload = vec![0u8; len as usize];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(DecodeError::Truncated.into());
            }
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let msg = crate::wire::decode_message(&payload)?;
        trace!(len, "received message");
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelink_types::message::{ControlMessage, PROTOCOL_VERSION};
    use edgelink_types::{InputEvent, Screen, SequencedEvent};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn send_and_receive_over_loopback() {
        let listener = ControlListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dial = tokio::spawn(async move { connect(addr).await.unwrap() });
        let (_sender_a, mut receiver_a, _remote) = listener.accept().await.unwrap();
        let (mut sender_b, _receiver_b) = dial.await.unwrap();

        let msg = ControlMessage::Hello {
            version: PROTOCOL_VERSION,
            node_name: "laptop".to_string(),
            screen: Screen::new("laptop", 1280, 800),
        };
        sender_b.send(&msg).await.unwrap();

        let received: ControlMessage = receiver_a.recv().await.unwrap().unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let listener = ControlListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dial = tokio::spawn(async move { connect(addr).await.unwrap() });
        let (_sender_a, mut receiver_a, _remote) = listener.accept().await.unwrap();
        let (mut sender_b, _receiver_b) = dial.await.unwrap();

        sender_b
            .send(&ControlMessage::Event(SequencedEvent {
                sequence: 1,
                timestamp: 0.0,
                event: InputEvent::Move { dx: 1, dy: 1 },
            }))
            .await
            .unwrap();
        sender_b.finish().await.unwrap();

        let first: Option<ControlMessage> = receiver_a.recv().await.unwrap();
        assert!(first.is_some());
        let second: Option<ControlMessage> = receiver_a.recv().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn oversize_length_prefix_is_rejected() {
        let listener = ControlListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dial = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_sender_a, mut receiver_a, _remote) = listener.accept().await.unwrap();
        let mut raw = dial.await.unwrap();

        raw.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        raw.flush().await.unwrap();

        let err = receiver_a.recv::<ControlMessage>().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Decode(DecodeError::BadLength)
        ));
    }

    #[tokio::test]
    async fn mid_frame_close_is_truncated() {
        let listener = ControlListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dial = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_sender_a, mut receiver_a, _remote) = listener.accept().await.unwrap();
        let mut raw = dial.await.unwrap();

        // Declare 100 bytes but send only 3, then close.
        raw.write_all(&100u32.to_be_bytes()).await.unwrap();
        raw.write_all(&[1, 2, 3]).await.unwrap();
        raw.shutdown().await.unwrap();
        drop(raw);

        let err = receiver_a.recv::<ControlMessage>().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Decode(DecodeError::Truncated)
        ));
    }
}

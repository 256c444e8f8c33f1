//! Protocol and transport errors.

use thiserror::Error;

/// Ways a received frame can fail to decode.
///
/// All of these are recovered locally: the channel closes and reconnects
/// rather than crashing the agent.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame ended before the declared payload length.
    #[error("frame truncated before declared length")]
    Truncated,

    /// The payload carried an unrecognised message or event tag.
    #[error("unknown message kind")]
    UnknownKind,

    /// The declared length exceeds the cap, or the payload length does not
    /// match its contents.
    #[error("frame length does not match payload")]
    BadLength,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("incompatible protocol version: remote {remote}, local {local}")]
    VersionMismatch { remote: String, local: String },

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProtocolError {
    /// Whether this failure warrants dropping the connection and
    /// reconnecting, as opposed to a fatal misconfiguration.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::VersionMismatch { .. })
    }
}

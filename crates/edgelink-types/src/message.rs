//! Control-channel message types.
//!
//! Messages are exchanged over a TCP control channel between edgelink
//! agents, one channel per peer pair.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::event::SequencedEvent;
use crate::screen::Screen;

/// Current protocol version.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 0, minor: 1 };

/// Protocol version for compatibility negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Peers interoperate when their major versions match.
    #[must_use]
    pub fn is_compatible(self, other: Self) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Messages on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum ControlMessage {
    /// Initial handshake from the dialing agent.
    Hello {
        version: ProtocolVersion,
        node_name: String,
        screen: Screen,
    },

    /// Response to Hello.
    Welcome {
        version: ProtocolVersion,
        node_name: String,
        screen: Screen,
    },

    /// Announce which screen currently owns the shared cursor.
    ///
    /// Sent after the handshake and again after every reconnect so both
    /// sides resume from an agreed ownership state.
    ActiveScreen { screen_name: String },

    /// A sequenced input event.
    Event(SequencedEvent),

    /// Graceful disconnect.
    Bye,
}

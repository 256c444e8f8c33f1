//! Control-channel protocol for edgelink.
//!
//! This crate handles TCP connection management, message framing and
//! serialisation (via bincode v2), and per-channel event sequencing with
//! handoff-barrier ordering.

pub mod channel;
pub mod error;
pub mod sequence;
pub mod wire;

pub use channel::{connect, ControlListener, MessageReceiver, MessageSender};
pub use error::{DecodeError, ProtocolError};
pub use sequence::{ReceiveSequencer, SendSequence};

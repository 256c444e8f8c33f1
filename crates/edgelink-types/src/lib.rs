//! Shared types for edgelink.
//!
//! This crate contains all types shared across the edgelink workspace:
//! screen geometry, the screen topology, the cursor state machine, input
//! events, and control-channel messages.

pub mod cursor;
pub mod event;
pub mod message;
pub mod screen;
pub mod topology;

pub use cursor::{CursorTracker, EdgeTransition, DEFAULT_EDGE_THRESHOLD};
pub use event::{unix_timestamp, InputEvent, MouseButton, SequencedEvent};
pub use message::{ControlMessage, ProtocolVersion, PROTOCOL_VERSION};
pub use screen::{Edge, Screen, ScreenId};
pub use topology::{Topology, TopologyError};

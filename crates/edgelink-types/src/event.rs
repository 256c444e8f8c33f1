//! Input event types.
//!
//! Platform-agnostic representations of pointer motion, buttons, scrolling,
//! and screen handoffs.

use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A pointer event, or the handoff marker produced by an edge crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum InputEvent {
    /// Relative pointer motion.
    Move { dx: i32, dy: i32 },

    /// Button press or release.
    Button { button: MouseButton, pressed: bool },

    /// Vertical scroll; positive is away from the user.
    Wheel { delta: i32 },

    /// The cursor crossed a screen boundary.
    ///
    /// Screens are named rather than indexed so both peers can resolve the
    /// transition against their own topology instance.
    EdgeCross {
        from_screen: String,
        to_screen: String,
        entry_x: i32,
        entry_y: i32,
    },
}

impl InputEvent {
    /// Handoff events act as ordering barriers on the control channel.
    #[must_use]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::EdgeCross { .. })
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    /// Extra buttons beyond the standard five.
    Other(u16),
}

/// An event stamped for transmission on a control channel.
///
/// Sequence numbers are assigned per channel instance, monotonically from 1;
/// the timestamp is producer wall-clock seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub timestamp: f64,
    pub event: InputEvent,
}

impl SequencedEvent {
    /// Stamp an event with a sequence number and the current time.
    #[must_use]
    pub fn new(sequence: u64, event: InputEvent) -> Self {
        Self {
            sequence,
            timestamp: unix_timestamp(),
            event,
        }
    }
}

/// Seconds since the Unix epoch as a float, 0.0 if the clock is unset.
#[must_use]
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bincode_roundtrip<T: Encode + Decode<()> + std::fmt::Debug>(value: &T) -> T {
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(value, config).unwrap();
        let (decoded, _): (T, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        decoded
    }

    #[test]
    fn move_roundtrip() {
        let event = InputEvent::Move { dx: -42, dy: 100 };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn button_roundtrip() {
        let event = InputEvent::Button {
            button: MouseButton::Middle,
            pressed: true,
        };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn wheel_roundtrip() {
        let event = InputEvent::Wheel { delta: -3 };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn edge_cross_roundtrip() {
        let event = InputEvent::EdgeCross {
            from_screen: "desk".to_string(),
            to_screen: "laptop".to_string(),
            entry_x: 0,
            entry_y: 540,
        };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn other_button_roundtrip() {
        let event = InputEvent::Button {
            button: MouseButton::Other(42),
            pressed: false,
        };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn sequenced_event_roundtrip() {
        let event = SequencedEvent {
            sequence: 7,
            timestamp: 1_700_000_000.25,
            event: InputEvent::Move { dx: 1, dy: -1 },
        };
        assert_eq!(bincode_roundtrip(&event), event);
    }

    #[test]
    fn only_edge_cross_is_a_barrier() {
        assert!(InputEvent::EdgeCross {
            from_screen: "a".to_string(),
            to_screen: "b".to_string(),
            entry_x: 0,
            entry_y: 0,
        }
        .is_barrier());
        assert!(!InputEvent::Move { dx: 1, dy: 1 }.is_barrier());
        assert!(!InputEvent::Wheel { delta: 1 }.is_barrier());
    }

    #[test]
    fn timestamps_are_recent_and_ordered() {
        let first = SequencedEvent::new(1, InputEvent::Move { dx: 0, dy: 0 });
        let second = SequencedEvent::new(2, InputEvent::Move { dx: 0, dy: 0 });
        assert!(first.timestamp > 1_500_000_000.0);
        assert!(second.timestamp >= first.timestamp);
    }
}

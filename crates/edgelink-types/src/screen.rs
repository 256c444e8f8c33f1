//! Screen identity and geometry.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A display owned by one host in the shared-pointer network.
///
/// Screens are identified by name; the name must be unique within a
/// [`Topology`](crate::topology::Topology). Geometry is immutable once the
/// screen is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Screen {
    /// Unique screen name, typically the owning host's node name.
    pub name: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Screen {
    #[must_use]
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Width as a signed coordinate, saturating on overflow.
    #[must_use]
    pub fn max_x(&self) -> i32 {
        i32::try_from(self.width).unwrap_or(i32::MAX)
    }

    /// Height as a signed coordinate, saturating on overflow.
    #[must_use]
    pub fn max_y(&self) -> i32 {
        i32::try_from(self.height).unwrap_or(i32::MAX)
    }

    /// Clamp a coordinate pair to this screen's bounds (inclusive).
    #[must_use]
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(0, self.max_x()), y.clamp(0, self.max_y()))
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Index of a registered screen within its topology.
///
/// Only valid for the topology that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct ScreenId(pub u16);

impl std::fmt::Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "screen#{}", self.0)
    }
}

/// One of the four screen borders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    /// The edge a cursor enters on the neighbor after leaving through this one.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
        }
    }

    /// All edges in crossing-priority order (horizontal before vertical).
    #[must_use]
    pub fn priority_order() -> [Self; 4] {
        [Self::Left, Self::Right, Self::Top, Self::Bottom]
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        };
        f.write_str(s)
    }
}

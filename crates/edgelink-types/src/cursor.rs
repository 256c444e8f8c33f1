//! Cursor state machine: absolute position tracking and edge-crossing
//! detection.

use crate::screen::{Edge, Screen, ScreenId};
use crate::topology::Topology;

/// Default width of the crossing hysteresis band, in pixels.
pub const DEFAULT_EDGE_THRESHOLD: u32 = 10;

/// A completed handoff: the cursor left one screen and entered another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeTransition {
    pub from: ScreenId,
    pub to: ScreenId,
    /// The edge crossed on the departing screen.
    pub edge: Edge,
    /// Entry position on the entered screen.
    pub entry_x: i32,
    pub entry_y: i32,
}

/// Tracks the shared cursor: which screen owns it and where it is.
///
/// Exactly one screen is active at any time. Positions stay within
/// `[0, width] x [0, height]` of the active screen after every call;
/// only the unclamped candidate position inside [`Self::apply_delta`]
/// may transiently leave those bounds.
#[derive(Debug, Clone)]
pub struct CursorTracker {
    active: ScreenId,
    x: i32,
    y: i32,
    threshold: i32,
}

impl CursorTracker {
    /// Create a tracker with the cursor parked at the origin of `active`.
    #[must_use]
    pub fn new(active: ScreenId, edge_threshold: u32) -> Self {
        Self {
            active,
            x: 0,
            y: 0,
            threshold: i32::try_from(edge_threshold).unwrap_or(i32::MAX),
        }
    }

    #[must_use]
    pub fn active_screen(&self) -> ScreenId {
        self.active
    }

    #[must_use]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Place the cursor at an absolute position, possibly on another screen.
    ///
    /// Used when applying a remote handoff and when resyncing after a
    /// reconnect; no crossing detection happens here.
    pub fn warp(&mut self, screen: ScreenId, x: i32, y: i32) {
        self.active = screen;
        self.x = x;
        self.y = y;
    }

    /// Apply a motion delta, detecting at most one edge crossing.
    ///
    /// A crossing fires when the motion starts on the interior side of an
    /// edge's hysteresis band and ends on the edge side in this single
    /// step; a cursor already inside the band cannot re-trigger. Edges are
    /// tried in horizontal-before-vertical priority order, and an edge
    /// with no connected neighbor is skipped. When a crossing fires the
    /// active screen switches and the position is remapped to the entry
    /// edge of the neighbor; otherwise the position is clamped to the
    /// active screen's bounds.
    pub fn apply_delta(&mut self, topology: &Topology, dx: i32, dy: i32) -> Option<EdgeTransition> {
        let screen = topology.screen(self.active)?;
        let (old_x, old_y) = (self.x, self.y);
        let new_x = old_x.saturating_add(dx);
        let new_y = old_y.saturating_add(dy);

        for edge in Edge::priority_order() {
            if !self.crosses(edge, screen, (old_x, old_y), (new_x, new_y)) {
                continue;
            }
            let Some(to) = topology.neighbor_of(self.active, edge) else {
                continue;
            };
            let Some(neighbor) = topology.screen(to) else {
                continue;
            };
            let (entry_x, entry_y) = entry_point(edge, neighbor, new_x, new_y);
            let transition = EdgeTransition {
                from: self.active,
                to,
                edge,
                entry_x,
                entry_y,
            };
            self.active = to;
            self.x = entry_x;
            self.y = entry_y;
            return Some(transition);
        }

        let (cx, cy) = screen.clamp(new_x, new_y);
        self.x = cx;
        self.y = cy;
        None
    }

    fn crosses(&self, edge: Edge, screen: &Screen, old: (i32, i32), new: (i32, i32)) -> bool {
        let thr = self.threshold;
        let right_band = screen.max_x().saturating_sub(thr);
        let bottom_band = screen.max_y().saturating_sub(thr);
        match edge {
            Edge::Left => old.0 > thr && new.0 <= thr,
            Edge::Right => old.0 < right_band && new.0 >= right_band,
            Edge::Top => old.1 > thr && new.1 <= thr,
            Edge::Bottom => old.1 < bottom_band && new.1 >= bottom_band,
        }
    }
}

/// Remap a crossing onto the entered screen: the crossed coordinate lands
/// on the opposite edge, the orthogonal coordinate carries through clamped.
fn entry_point(edge: Edge, neighbor: &Screen, new_x: i32, new_y: i32) -> (i32, i32) {
    match edge {
        Edge::Right => (0, new_y.clamp(0, neighbor.max_y())),
        Edge::Left => (
            neighbor.max_x().saturating_sub(1),
            new_y.clamp(0, neighbor.max_y()),
        ),
        Edge::Bottom => (new_x.clamp(0, neighbor.max_x()), 0),
        Edge::Top => (
            new_x.clamp(0, neighbor.max_x()),
            neighbor.max_y().saturating_sub(1),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_by_side() -> (Topology, ScreenId, ScreenId) {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        let b = topo.register_screen(Screen::new("b", 1920, 1080)).unwrap();
        topo.connect("a", Edge::Right, "b", Edge::Left).unwrap();
        (topo, a, b)
    }

    #[test]
    fn interior_motion_never_crosses() {
        let (topo, a, _) = side_by_side();
        let mut cursor = CursorTracker::new(a, DEFAULT_EDGE_THRESHOLD);
        cursor.warp(a, 960, 540);

        assert_eq!(cursor.apply_delta(&topo, 100, -200), None);
        assert_eq!(cursor.position(), (1060, 340));
        assert_eq!(cursor.apply_delta(&topo, -500, 500), None);
        assert_eq!(cursor.position(), (560, 840));
        assert_eq!(cursor.active_screen(), a);
    }

    #[test]
    fn motion_clamps_inclusively_without_neighbor() {
        let (topo, a, _) = side_by_side();
        let mut cursor = CursorTracker::new(a, DEFAULT_EDGE_THRESHOLD);
        cursor.warp(a, 960, 540);

        // No neighbor above: the predicate fires but nothing resolves.
        assert_eq!(cursor.apply_delta(&topo, 0, -5000), None);
        assert_eq!(cursor.position(), (960, 0));
        assert_eq!(cursor.active_screen(), a);
    }

    #[test]
    fn right_crossing_enters_neighbor_at_zero() {
        let (topo, a, b) = side_by_side();
        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 1905, 540);

        let transition = cursor.apply_delta(&topo, 10, 0).unwrap();
        assert_eq!(transition.from, a);
        assert_eq!(transition.to, b);
        assert_eq!(transition.edge, Edge::Right);
        assert_eq!((transition.entry_x, transition.entry_y), (0, 540));
        assert_eq!(cursor.active_screen(), b);
        assert_eq!(cursor.position(), (0, 540));
    }

    #[test]
    fn motion_inside_band_does_not_retrigger() {
        let (topo, a, _) = side_by_side();
        let mut cursor = CursorTracker::new(a, 10);
        // Already past the band boundary, as after entering from the right.
        cursor.warp(a, 1915, 540);

        assert_eq!(cursor.apply_delta(&topo, 10, 0), None);
        assert_eq!(cursor.position(), (1920, 540));
        assert_eq!(cursor.active_screen(), a);
    }

    #[test]
    fn left_then_right_round_trip() {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        let b = topo.register_screen(Screen::new("b", 1920, 1080)).unwrap();
        topo.connect("a", Edge::Left, "b", Edge::Right).unwrap();

        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 15, 500);

        let out = cursor.apply_delta(&topo, -10, 0).unwrap();
        assert_eq!(out.edge, Edge::Left);
        assert_eq!(cursor.active_screen(), b);
        assert_eq!(cursor.position(), (1919, 500));

        // Step out of the band, then back across.
        assert_eq!(cursor.apply_delta(&topo, -20, 0), None);
        let back = cursor.apply_delta(&topo, 20, 0).unwrap();
        assert_eq!(back.edge, Edge::Right);
        assert_eq!(cursor.active_screen(), a);
        // Entry lands inside the left hysteresis band of the origin.
        assert_eq!(cursor.position(), (0, 500));
    }

    #[test]
    fn vertical_crossing_maps_entry_rows() {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        let below = topo.register_screen(Screen::new("below", 1920, 1080)).unwrap();
        topo.connect("a", Edge::Bottom, "below", Edge::Top).unwrap();

        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 800, 1060);

        let down = cursor.apply_delta(&topo, 0, 15).unwrap();
        assert_eq!(down.edge, Edge::Bottom);
        assert_eq!(cursor.active_screen(), below);
        assert_eq!(cursor.position(), (800, 0));

        cursor.warp(below, 800, 15);
        let up = cursor.apply_delta(&topo, 0, -10).unwrap();
        assert_eq!(up.edge, Edge::Top);
        assert_eq!(cursor.active_screen(), a);
        assert_eq!(cursor.position(), (800, 1079));
    }

    #[test]
    fn diagonal_prefers_horizontal_edge() {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        topo.register_screen(Screen::new("west", 1920, 1080)).unwrap();
        topo.register_screen(Screen::new("north", 1920, 1080)).unwrap();
        topo.connect("a", Edge::Left, "west", Edge::Right).unwrap();
        topo.connect("a", Edge::Top, "north", Edge::Bottom).unwrap();

        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 500, 500);

        // Large diagonal delta satisfies both the left and top predicates.
        let transition = cursor.apply_delta(&topo, -495, -495).unwrap();
        assert_eq!(transition.edge, Edge::Left);
        assert_eq!(cursor.active_screen(), topo.find("west").unwrap());
    }

    #[test]
    fn unconnected_edge_yields_to_next_priority() {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        topo.register_screen(Screen::new("north", 1920, 1080)).unwrap();
        topo.connect("a", Edge::Top, "north", Edge::Bottom).unwrap();

        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 500, 500);

        // Left predicate fires first but has no neighbor; top resolves.
        let transition = cursor.apply_delta(&topo, -495, -495).unwrap();
        assert_eq!(transition.edge, Edge::Top);
        assert_eq!(cursor.active_screen(), topo.find("north").unwrap());
    }

    #[test]
    fn orthogonal_coordinate_clamps_to_neighbor() {
        let mut topo = Topology::new();
        let a = topo.register_screen(Screen::new("a", 1920, 1080)).unwrap();
        let b = topo.register_screen(Screen::new("short", 1280, 720)).unwrap();
        topo.connect("a", Edge::Right, "short", Edge::Left).unwrap();

        let mut cursor = CursorTracker::new(a, 10);
        cursor.warp(a, 1905, 1000);

        let transition = cursor.apply_delta(&topo, 10, 0).unwrap();
        assert_eq!(transition.to, b);
        assert_eq!((transition.entry_x, transition.entry_y), (0, 720));
    }
}

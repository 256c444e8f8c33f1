//! Screen topology: which edges connect to which neighbor.

use std::collections::HashMap;

use crate::screen::{Edge, Screen, ScreenId};

/// Errors raised while building a topology.
///
/// All of these are configuration mistakes and fatal at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("duplicate screen name: {0}")]
    DuplicateScreen(String),

    #[error("unknown screen: {0}")]
    UnknownScreen(String),

    #[error("{edge} edge of {screen} is already bound to another screen")]
    EdgeAlreadyBound { screen: String, edge: Edge },

    #[error("link edges must be opposites, got {edge_a} and {edge_b}")]
    AsymmetricLink { edge_a: Edge, edge_b: Edge },

    #[error("screen registry is full")]
    RegistryFull,
}

/// Registry of screens and the edge links between them.
///
/// Links are always symmetric: connecting A's right edge to B also binds
/// B's left edge back to A. Instances are independent; nothing here is
/// process-global.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    screens: Vec<Screen>,
    links: HashMap<(ScreenId, Edge), ScreenId>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a screen, returning its id.
    pub fn register_screen(&mut self, screen: Screen) -> Result<ScreenId, TopologyError> {
        if self.find(&screen.name).is_some() {
            return Err(TopologyError::DuplicateScreen(screen.name));
        }
        let Ok(index) = u16::try_from(self.screens.len()) else {
            return Err(TopologyError::RegistryFull);
        };
        self.screens.push(screen);
        Ok(ScreenId(index))
    }

    /// Bind `a`'s `edge_a` to `b`, and `b`'s `edge_b` back to `a`.
    ///
    /// The two edges must be opposites. Re-connecting an identical link is
    /// accepted; binding an edge to a different neighbor is an error.
    pub fn connect(
        &mut self,
        a: &str,
        edge_a: Edge,
        b: &str,
        edge_b: Edge,
    ) -> Result<(), TopologyError> {
        if edge_b != edge_a.opposite() {
            return Err(TopologyError::AsymmetricLink { edge_a, edge_b });
        }
        let a_id = self
            .find(a)
            .ok_or_else(|| TopologyError::UnknownScreen(a.to_string()))?;
        let b_id = self
            .find(b)
            .ok_or_else(|| TopologyError::UnknownScreen(b.to_string()))?;

        for (id, edge, target) in [(a_id, edge_a, b_id), (b_id, edge_b, a_id)] {
            if let Some(&bound) = self.links.get(&(id, edge)) {
                if bound != target {
                    return Err(TopologyError::EdgeAlreadyBound {
                        screen: self.name_of(id).unwrap_or_default().to_string(),
                        edge,
                    });
                }
            }
        }

        self.links.insert((a_id, edge_a), b_id);
        self.links.insert((b_id, edge_b), a_id);
        Ok(())
    }

    /// Pure lookup of the neighbor across an edge.
    #[must_use]
    pub fn neighbor_of(&self, screen: ScreenId, edge: Edge) -> Option<ScreenId> {
        self.links.get(&(screen, edge)).copied()
    }

    /// The screen registered under `id`, if it belongs to this topology.
    #[must_use]
    pub fn screen(&self, id: ScreenId) -> Option<&Screen> {
        self.screens.get(usize::from(id.0))
    }

    /// Name of a registered screen.
    #[must_use]
    pub fn name_of(&self, id: ScreenId) -> Option<&str> {
        self.screen(id).map(|s| s.name.as_str())
    }

    /// Look a screen up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ScreenId> {
        self.screens
            .iter()
            .position(|s| s.name == name)
            .and_then(|i| u16::try_from(i).ok())
            .map(ScreenId)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.screens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

//! No-op backends for hosts without an OS binding.

use async_trait::async_trait;
use edgelink_types::{InputEvent, MouseButton};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::InputError;
use crate::{InjectionSink, PointerSource};

/// Injection sink that accepts everything and does nothing.
///
/// Used when no OS backend is available; warns once on first use so a
/// misconfigured peer is visible in the logs without crashing.
#[derive(Debug, Default)]
pub struct NoopSink {
    warned: bool,
}

impl NoopSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn warn_once(&mut self) {
        if !self.warned {
            self.warned = true;
            warn!("no injection backend available, pointer events will be dropped");
        }
    }
}

#[async_trait]
impl InjectionSink for NoopSink {
    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.warn_once();
        debug!(x, y, "dropping absolute move");
        Ok(())
    }

    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.warn_once();
        debug!(dx, dy, "dropping relative move");
        Ok(())
    }

    async fn set_button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InputError> {
        self.warn_once();
        debug!(?button, pressed, "dropping button event");
        Ok(())
    }

    async fn scroll(&mut self, delta: i32) -> Result<(), InputError> {
        self.warn_once();
        debug!(delta, "dropping scroll event");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}

/// Pointer source that never produces an event.
///
/// Hosts that only receive redirected input (no local capture backend)
/// run on this.
#[derive(Debug, Default)]
pub struct NullSource;

impl NullSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PointerSource for NullSource {
    async fn start(&mut self, _tx: mpsc::Sender<InputEvent>) -> Result<(), InputError> {
        debug!("null pointer source started, no local capture");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}

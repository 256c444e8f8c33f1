//! Pointer injection and capture capabilities for edgelink.
//!
//! This crate defines the [`InjectionSink`] trait that OS-specific cursor
//! backends implement, and the [`PointerSource`] trait that local capture
//! backends implement. Concrete uinput (Linux) and SendInput (Windows)
//! backends live outside the core; headless hosts run on the bundled
//! [`NoopSink`].

use async_trait::async_trait;
use edgelink_types::{InputEvent, MouseButton};
use tokio::sync::mpsc;

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod noop;

pub use error::InputError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockSink, MockSinkHandle, MockSource, SinkCall};
pub use noop::{NoopSink, NullSource};

/// Applies redirected pointer input to the local operating system.
///
/// Every operation must succeed (possibly as a no-op) even when no real
/// backend exists, so the state machine and protocol layers stay testable
/// headlessly.
#[async_trait]
pub trait InjectionSink: Send + Sync + 'static {
    /// Place the cursor at an absolute position on the local screen.
    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError>;

    /// Move the cursor by a delta.
    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError>;

    /// Press or release a button.
    async fn set_button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InputError>;

    /// Scroll vertically; positive is away from the user.
    async fn scroll(&mut self, delta: i32) -> Result<(), InputError>;

    /// Shut the backend down; no further calls will be made after this.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}

/// Produces local pointer events for the agent.
///
/// Sources emit `Move`, `Button`, and `Wheel` events only; handoff events
/// are derived by the cursor state machine, never captured.
#[async_trait]
pub trait PointerSource: Send + Sync + 'static {
    /// Start capturing, sending events to `tx`.
    async fn start(&mut self, tx: mpsc::Sender<InputEvent>) -> Result<(), InputError>;

    /// Stop capturing and release any grabbed devices.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}

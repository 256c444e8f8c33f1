//! Mock input backends for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use edgelink_types::{InputEvent, MouseButton};
use tokio::sync::mpsc;

use crate::error::InputError;
use crate::{InjectionSink, PointerSource};

/// One recorded sink invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    MoveAbsolute { x: i32, y: i32 },
    MoveRelative { dx: i32, dy: i32 },
    SetButton { button: MouseButton, pressed: bool },
    Scroll { delta: i32 },
}

#[derive(Debug, Default)]
struct MockSinkState {
    calls: Vec<SinkCall>,
    shutdown: bool,
}

/// Injection sink that records every call for test observation.
pub struct MockSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSinkState::default())),
        }
    }

    /// Get a clonable handle for observing sink calls from tests.
    #[must_use]
    pub fn handle(&self) -> MockSinkHandle {
        MockSinkHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: SinkCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Clonable observer handle for [`MockSink`].
#[derive(Clone)]
pub struct MockSinkHandle {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockSinkHandle {
    /// Snapshot of all recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The most recent absolute cursor position, if any was set.
    #[must_use]
    pub fn last_position(&self) -> Option<(i32, i32)> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                SinkCall::MoveAbsolute { x, y } => Some((*x, *y)),
                _ => None,
            })
    }

    /// Check if shutdown was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }
}

#[async_trait]
impl InjectionSink for MockSink {
    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.record(SinkCall::MoveAbsolute { x, y });
        Ok(())
    }

    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.record(SinkCall::MoveRelative { dx, dy });
        Ok(())
    }

    async fn set_button(&mut self, button: MouseButton, pressed: bool) -> Result<(), InputError> {
        self.record(SinkCall::SetButton { button, pressed });
        Ok(())
    }

    async fn scroll(&mut self, delta: i32) -> Result<(), InputError> {
        self.record(SinkCall::Scroll { delta });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

/// Mock pointer source for testing.
///
/// Returns an `mpsc::Sender<InputEvent>` that tests use to inject local
/// events. When `start()` is called, a task forwards injected events to
/// the agent's capture channel.
pub struct MockSource {
    feed_rx: Option<mpsc::Receiver<InputEvent>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSource {
    /// Create a new mock source and a sender for injecting events.
    pub fn new() -> (Self, mpsc::Sender<InputEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(1024);
        let source = Self {
            feed_rx: Some(feed_rx),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        (source, feed_tx)
    }
}

#[async_trait]
impl PointerSource for MockSource {
    async fn start(&mut self, tx: mpsc::Sender<InputEvent>) -> Result<(), InputError> {
        let mut feed_rx = self
            .feed_rx
            .take()
            .ok_or_else(|| InputError::Other(anyhow::anyhow!("MockSource already started")))?;
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }
}

//! The edgelink peer agent.
//!
//! Ties the cursor state machine, control channels, and discovery together
//! into one event-driven loop per host. Every host runs the same agent;
//! there is no server role.

pub mod agent;
pub mod config;
pub mod error;
pub mod session;

pub use agent::{Agent, AgentEvent, AgentStatus};
pub use config::AgentConfig;
pub use error::AgentError;
pub use session::PeerSession;

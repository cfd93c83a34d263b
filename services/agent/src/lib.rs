//! flotilla Node Agent Library
//!
//! The node agent runs on each worker machine of a flotilla cluster. It
//! registers with the master, launches framework executors under an
//! isolation mechanism, runs tasks inside them, and relays status updates
//! reliably back to the master.
//!
//! ## Architecture
//!
//! Two cooperative single-threaded actors plus an inline isolation bridge:
//!
//! ```text
//! Agent  (one mailbox: wire messages, link exits, reaper reports, ticks)
//! ├── MasterSession          registration / re-registration / ping
//! ├── Framework tree         frameworks → executors → tasks
//! ├── PendingUpdates         at-least-once status-update retransmission
//! └── Isolation bridge       launch / kill / resourcesChanged
//! Reaper (waitpid loop; reports executor exits back to the agent)
//! ```
//!
//! ## Modules
//!
//! - `agent`: the agent actor and its event loop
//! - `session`: master session state machine
//! - `state`: local state tree and the pending-update table
//! - `reaper`: child-process reaping
//! - `isolation`: executor launch/kill interface and implementations
//! - `wire`: endpoint messaging seam
//! - `snapshot`: read-only introspection documents

pub mod agent;
pub mod config;
pub mod isolation;
pub mod reaper;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod wire;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentEvent, AgentHandle};
pub use config::Config;
pub use isolation::{Isolation, MockIsolation, ProcessIsolation};
pub use reaper::{Reaper, ReaperHandle};
pub use wire::{LoopbackWire, Wire, WireEvent};

//! # flotilla-messages
//!
//! Wire protocol and data model shared by the flotilla master, node agents,
//! schedulers and executors.
//!
//! ## Contents
//!
//! - `Endpoint`: the `name@host:port` address of a message endpoint
//! - `Envelope`: an addressed wire message
//! - `Message`: the tagged union of every protocol message
//! - `Resources`: named scalar resource vectors (`cpus:1;mem:1024`)
//! - Descriptor types (`SlaveInfo`, `FrameworkInfo`, `ExecutorInfo`,
//!   `TaskDescription`) and the task state model

mod envelope;
mod error;
mod resources;
mod types;

pub use envelope::{Endpoint, Envelope};
pub use error::MessageError;
pub use resources::Resources;
pub use types::*;

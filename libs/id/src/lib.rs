//! # flotilla-id
//!
//! Typed identifiers for the flotilla cluster manager.
//!
//! ## Design Principles
//!
//! - Identifiers are assigned by a remote party and treated as opaque: the
//!   master assigns `SlaveId`, frameworks assign `FrameworkId`, `ExecutorId`
//!   and `TaskId`
//! - All identifiers have a canonical string representation with strict
//!   parsing (never empty, no whitespace or control characters)
//! - Identifiers support roundtrip serialization (parse → format → parse)
//! - Identifiers are typed to prevent mixing different resource kinds

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

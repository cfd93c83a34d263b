//! Error types for wire message handling.

use thiserror::Error;

/// Errors that can occur when parsing or encoding wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// An endpoint address is malformed.
    #[error("invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    /// A resource vector string is malformed.
    #[error("invalid resource specification: {0}")]
    InvalidResources(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        MessageError::Serialization(err.to_string())
    }
}

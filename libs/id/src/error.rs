//! Error types for identifier parsing.

use thiserror::Error;

/// Errors that can occur when parsing an identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier contains a forbidden character.
    #[error("identifier contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}

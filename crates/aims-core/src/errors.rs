//! Cross-cutting error types for AIMS.
//!
//! Domain-specific errors (`ParseError`, `DatabaseError`, `ConfigError`) are
//! defined in their respective crates.

use thiserror::Error;

/// Errors that can be raised by any AIMS crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A state machine transition was attempted that is not allowed.
    #[error("Invalid state transition: {entity_type} {id} from {from} to {to}")]
    InvalidTransition {
        entity_type: String,
        id: String,
        from: String,
        to: String,
    },

    /// Data failed validation (required fields, format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

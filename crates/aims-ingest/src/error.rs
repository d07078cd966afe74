//! Parse error types for aims-ingest.

use thiserror::Error;

/// A document that cannot be turned into an activity graph.
///
/// Fatal for the whole document: nothing is validated or resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The XML reader rejected the input (bad syntax, mismatched end tag).
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: usize, message: String },

    /// The document ended with elements still open, or closed one too many.
    #[error("Unbalanced nesting: {0}")]
    Unbalanced(String),

    /// The root element is not an IATI activity container.
    #[error("Unexpected root element <{0}>, expected <iati-activities> or <iati-activity>")]
    UnexpectedRoot(String),

    /// A numeric-only leaf holds text that is not a number.
    #[error("Non-numeric {field} at {path}: {value:?}")]
    InvalidNumber {
        path: String,
        field: String,
        value: String,
    },

    /// A date leaf holds text that is not an ISO date.
    #[error("Invalid date {field} at {path}: {value:?}")]
    InvalidDate {
        path: String,
        field: String,
        value: String,
    },
}

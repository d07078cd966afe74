//! Database and workflow error types for aims-db.

use aims_core::enums::ImportStatus;
use aims_core::errors::CoreError;
use aims_core::reference::ReferenceKey;
use aims_ingest::ParseError;
use thiserror::Error;

/// Errors from database operations and the import workflow.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An identifier is already held by another organization.
    #[error("Identifier '{value}' already belongs to organization {conflicting_entity_id}")]
    AliasConflict {
        value: String,
        conflicting_entity_id: String,
    },

    /// Commit requested while references still need a decision.
    #[error("Import session {session_id} has {pending} unresolved reference(s)")]
    UnresolvedReferences { session_id: String, pending: usize },

    /// The session's status does not allow the requested action.
    #[error("Import session {session_id} is {status}; cannot {action}")]
    InvalidTransition {
        session_id: String,
        status: ImportStatus,
        action: String,
    },

    /// An operator decision was rejected.
    #[error("Decision for {key} rejected: {reason}")]
    InvalidDecision { key: ReferenceKey, reason: String },

    /// The session has no reference with this key.
    #[error("Import session {session_id} has no reference {key}")]
    UnknownReference {
        session_id: String,
        key: ReferenceKey,
    },

    /// The submitted document could not be parsed; the session was recorded
    /// as failed.
    #[error("Document for import session {session_id} could not be parsed: {source}")]
    Parse {
        session_id: String,
        #[source]
        source: ParseError,
    },

    /// A domain rule from aims-core was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    /// Whether this error is a constraint violation raised by the database
    /// (UNIQUE, CHECK, NOT NULL, FOREIGN KEY, or a trigger abort).
    ///
    /// The committer records these against the offending item and keeps
    /// going; anything else rolls the whole commit back.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::LibSql(e) => is_constraint_violation(e),
            _ => false,
        }
    }

    /// Errors an operator can fix by changing a decision.
    #[must_use]
    pub const fn is_decision_error(&self) -> bool {
        matches!(
            self,
            Self::AliasConflict { .. } | Self::InvalidDecision { .. } | Self::UnknownReference { .. }
        )
    }
}

/// Detect constraint failures from `SQLite`.
///
/// The predicate is intentionally narrow: `SQLITE_CONSTRAINT` (primary code
/// 19) or the "constraint failed" message `SQLite` attaches to it. Busy,
/// I/O, and connection errors never match.
pub fn is_constraint_violation(e: &libsql::Error) -> bool {
    if let libsql::Error::SqliteFailure(code, _) = e {
        if code & 0xff == 19 {
            return true;
        }
    }
    e.to_string().contains("constraint failed")
}

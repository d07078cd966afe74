//! Repository modules for the AIMS store and workflow.
//!
//! Each module adds methods to `AimsService` via `impl AimsService` blocks.
//! Functions that take a bare `&libsql::Connection` also run inside the
//! committer's transaction.

pub mod audit;
pub mod commit;
pub mod import_session;
pub mod organization;
pub mod workflow;

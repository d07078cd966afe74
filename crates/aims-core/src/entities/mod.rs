//! Persisted entity types.

mod audit;
mod organization;
mod session;

pub use audit::{NewAuditEntry, ResolutionAuditEntry};
pub use organization::{NewOrganization, Organization, normalize_alias_refs, normalize_name_aliases};
pub use session::{
    DecisionKind, ImportSession, OperatorDecision, ReferencePosition, ReferenceSlot, SlotOutcome,
};

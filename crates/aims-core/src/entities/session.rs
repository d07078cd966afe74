use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::NewOrganization;
use crate::enums::{ImportStatus, PartyRole, ResolutionMethod};
use crate::errors::CoreError;
use crate::graph::{ParsedGraph, ValidationFinding};
use crate::reference::{Reference, ReferenceKey};
use crate::resolution::ResolutionResult;
use crate::responses::ImportSummary;

/// Durable state of one import, from upload to commit.
///
/// Stored as a single JSON document keyed by `id`; every workflow call loads
/// it, mutates it, and writes it back, so an operator can leave and resume
/// with nothing but the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportSession {
    pub id: String,
    pub status: ImportStatus,
    pub actor: String,
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub graph: ParsedGraph,
    pub findings: Vec<ValidationFinding>,
    pub references: Vec<ReferenceSlot>,
    pub failure: Option<String>,
    pub summary: Option<ImportSummary>,
}

/// Where a reference occurs in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferencePosition {
    pub item_path: String,
    pub role: PartyRole,
}

/// One distinct reference in a session, with its automatic resolution and
/// the operator's decision, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceSlot {
    pub key: ReferenceKey,
    pub reference: Reference,
    pub positions: Vec<ReferencePosition>,
    /// First IATI organisation-type code seen next to this reference.
    pub type_code: Option<String>,
    pub resolution: ResolutionResult,
    pub decision: Option<OperatorDecision>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperatorDecision {
    pub kind: DecisionKind,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

/// What an operator chose for one reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DecisionKind {
    Link {
        entity_id: String,
        #[serde(default)]
        remember_mapping: bool,
    },
    Create {
        organization: NewOrganization,
    },
    Skip {
        reason: Option<String>,
    },
}

/// Effective outcome of a slot once automatic resolution and operator
/// decisions are combined. Operator decisions win.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome<'a> {
    Resolved {
        entity_id: &'a str,
        method: ResolutionMethod,
        confidence: Option<f64>,
        remember_mapping: bool,
    },
    Create(&'a NewOrganization),
    Skip(Option<&'a str>),
    Pending,
}

impl SlotOutcome<'_> {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl ReferenceSlot {
    #[must_use]
    pub fn outcome(&self) -> SlotOutcome<'_> {
        match self.decision.as_ref().map(|d| &d.kind) {
            Some(DecisionKind::Link {
                entity_id,
                remember_mapping,
            }) => SlotOutcome::Resolved {
                entity_id,
                method: ResolutionMethod::OperatorLink,
                confidence: None,
                remember_mapping: *remember_mapping,
            },
            Some(DecisionKind::Create { organization }) => SlotOutcome::Create(organization),
            Some(DecisionKind::Skip { reason }) => SlotOutcome::Skip(reason.as_deref()),
            None => match (
                self.resolution.matched,
                self.resolution.entity_id.as_deref(),
                self.resolution.method,
            ) {
                (true, Some(entity_id), Some(method)) => SlotOutcome::Resolved {
                    entity_id,
                    method,
                    confidence: self.resolution.confidence,
                    remember_mapping: false,
                },
                _ => SlotOutcome::Pending,
            },
        }
    }
}

impl ImportSession {
    #[must_use]
    pub fn slot(&self, key: &ReferenceKey) -> Option<&ReferenceSlot> {
        self.references.iter().find(|s| &s.key == key)
    }

    pub fn slot_mut(&mut self, key: &ReferenceKey) -> Option<&mut ReferenceSlot> {
        self.references.iter_mut().find(|s| &s.key == key)
    }

    /// Slots without an automatic match or an operator decision.
    #[must_use]
    pub fn pending(&self) -> Vec<&ReferenceSlot> {
        self.references
            .iter()
            .filter(|s| s.outcome().is_pending())
            .collect()
    }

    #[must_use]
    pub fn is_fully_decided(&self) -> bool {
        self.references.iter().all(|s| !s.outcome().is_pending())
    }

    /// Move to `next`, rejecting transitions the status machine forbids.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the move is not allowed.
    pub fn transition(&mut self, next: ImportStatus) -> Result<(), CoreError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                entity_type: "import_session".into(),
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `ReadyToCommit` when nothing is pending, otherwise `AwaitingResolution`.
    #[must_use]
    pub fn decided_status(&self) -> ImportStatus {
        if self.is_fully_decided() {
            ImportStatus::ReadyToCommit
        } else {
            ImportStatus::AwaitingResolution
        }
    }
}

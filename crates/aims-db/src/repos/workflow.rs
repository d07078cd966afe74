//! Human resolution workflow.
//!
//! `submit_document` parses, validates, and auto-resolves a document into a
//! persisted `ImportSession`. Operators then record decisions against the
//! session's pending references, possibly across several visits, until it
//! is ready to commit.

use std::collections::HashMap;

use aims_core::entities::{
    DecisionKind, ImportSession, NewOrganization, OperatorDecision, ReferencePosition,
    ReferenceSlot, normalize_alias_refs,
};
use aims_core::enums::{ImportStatus, OrgType};
use aims_core::graph::{ParsedGraph, ReferenceUse};
use aims_core::ids::PREFIX_IMPORT;
use aims_core::reference::{Reference, ReferenceKey};
use aims_core::resolution::{ResolutionResult, Resolver, UnresolvedReason};
use aims_core::responses::{CandidateMatch, DecisionReport, RejectedDecision};
use chrono::Utc;

use crate::error::DatabaseError;
use crate::repos::import_session::{load_session, store_session};
use crate::repos::organization::{fetch_catalog, fetch_organization, find_conflict};
use crate::service::AimsService;

/// Group reference uses into one slot per distinct normalized reference,
/// in order of first appearance.
fn collect_slots(uses: Vec<ReferenceUse>) -> Vec<ReferenceSlot> {
    let mut slots: Vec<ReferenceSlot> = Vec::new();
    let mut index: HashMap<ReferenceKey, usize> = HashMap::new();
    for use_ in uses {
        let key = use_.reference.key();
        let position = ReferencePosition {
            item_path: use_.item_path,
            role: use_.role,
        };
        if let Some(&i) = index.get(&key) {
            let slot = &mut slots[i];
            slot.positions.push(position);
            if slot.type_code.is_none() {
                slot.type_code = use_.type_code;
            }
            continue;
        }
        index.insert(key.clone(), slots.len());
        slots.push(ReferenceSlot {
            key,
            reference: use_.reference.normalized(),
            positions: vec![position],
            type_code: use_.type_code,
            resolution: ResolutionResult::unresolved(UnresolvedReason::NoCandidate),
            decision: None,
        });
    }
    slots
}

fn not_accepting(session: &ImportSession, action: &str) -> DatabaseError {
    DatabaseError::InvalidTransition {
        session_id: session.id.clone(),
        status: session.status,
        action: action.to_string(),
    }
}

impl AimsService {
    /// Parse, validate, and auto-resolve a document into a new session.
    ///
    /// The session is persisted before returning. If the document does not
    /// parse, a `failed` session is still recorded and its id is carried in
    /// the error.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Parse` for an unreadable document, or
    /// `DatabaseError` if the catalog or session store cannot be reached.
    pub async fn submit_document(
        &self,
        source_name: &str,
        xml: &str,
        actor: &str,
    ) -> Result<ImportSession, DatabaseError> {
        let _guard = self.write_lock().await;
        let conn = self.db().conn();

        let now = Utc::now();
        let mut session = ImportSession {
            id: self.db().generate_id(PREFIX_IMPORT).await?,
            status: ImportStatus::Parsing,
            actor: actor.to_string(),
            source_name: source_name.to_string(),
            started_at: now,
            updated_at: now,
            graph: ParsedGraph::default(),
            findings: Vec::new(),
            references: Vec::new(),
            failure: None,
            summary: None,
        };

        let graph = match aims_ingest::parse_xml(xml) {
            Ok(graph) => graph,
            Err(e) => {
                session.transition(ImportStatus::Failed)?;
                session.failure = Some(e.to_string());
                store_session(conn, &session).await?;
                tracing::warn!(session = %session.id, source = source_name, error = %e, "document rejected");
                return Err(DatabaseError::Parse {
                    session_id: session.id,
                    source: e,
                });
            }
        };

        session.transition(ImportStatus::Validating)?;
        let report = aims_ingest::validate(&graph, self.validation_rules());
        tracing::info!(
            session = %session.id,
            activities = report.graph.activities.len(),
            blocking = report.blocking().count(),
            warnings = report.warnings().count(),
            "document validated"
        );
        session.graph = report.graph;
        session.findings = report.findings;

        let mut slots = collect_slots(session.graph.references());
        let catalog = fetch_catalog(conn).await?;
        let resolver = Resolver::new(&catalog, self.similarity(), self.resolver_settings());
        let references: Vec<Reference> = slots.iter().map(|s| s.reference.clone()).collect();
        for (slot, resolution) in slots.iter_mut().zip(resolver.resolve_batch(&references)) {
            if !resolution.matched {
                tracing::warn!(
                    session = %session.id,
                    reference = %slot.reference,
                    reason = ?resolution.reason,
                    "reference needs an operator decision"
                );
            }
            slot.resolution = resolution;
        }
        session.references = slots;

        session.transition(session.decided_status())?;
        store_session(conn, &session).await?;
        tracing::info!(
            session = %session.id,
            status = %session.status,
            references = session.references.len(),
            pending = session.pending().len(),
            "import session opened"
        );
        Ok(session)
    }

    /// References still waiting for a decision.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if the session does not exist.
    pub async fn pending_references(
        &self,
        session_id: &str,
    ) -> Result<Vec<ReferenceSlot>, DatabaseError> {
        let _guard = self.read_lock().await;
        let session = load_session(self.db().conn(), session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        Ok(session.pending().into_iter().cloned().collect())
    }

    /// Link candidates for one pending reference, ranked by name similarity.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::UnknownReference` if the session has no such
    /// reference.
    pub async fn reference_candidates(
        &self,
        session_id: &str,
        key: &ReferenceKey,
        limit: usize,
    ) -> Result<Vec<CandidateMatch>, DatabaseError> {
        let _guard = self.read_lock().await;
        let session = load_session(self.db().conn(), session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        let slot = session
            .slot(key)
            .ok_or_else(|| DatabaseError::UnknownReference {
                session_id: session_id.to_string(),
                key: key.clone(),
            })?;
        let query = slot
            .reference
            .display_name
            .as_deref()
            .or(slot.reference.code.as_deref())
            .unwrap_or_default();
        let catalog = fetch_catalog(self.db().conn()).await?;
        let resolver = Resolver::new(&catalog, self.similarity(), self.resolver_settings());
        Ok(resolver.rank(query, limit))
    }

    /// Record one operator decision.
    ///
    /// The decision is checked against the current catalog before it is
    /// stored; a rejected decision leaves the session untouched.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidTransition` if the session no longer
    /// accepts decisions, `DatabaseError::UnknownReference`,
    /// `DatabaseError::InvalidDecision`, or `DatabaseError::AliasConflict`.
    pub async fn decide_reference(
        &self,
        session_id: &str,
        key: &ReferenceKey,
        decision: DecisionKind,
        actor: &str,
    ) -> Result<ImportSession, DatabaseError> {
        let _guard = self.write_lock().await;
        let conn = self.db().conn();
        let mut session = load_session(conn, session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        if !session.status.accepts_decisions() {
            return Err(not_accepting(&session, "record decisions"));
        }

        apply_decision(conn, &mut session, key, decision, actor).await?;
        session.transition(session.decided_status())?;
        store_session(conn, &session).await?;
        tracing::info!(session = %session.id, reference = %key, status = %session.status, "decision recorded");
        Ok(session)
    }

    /// Record several decisions. Each is checked on its own; rejected ones
    /// are reported and the rest are kept.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidTransition` if the session no longer
    /// accepts decisions, or `DatabaseError` for store failures.
    pub async fn decide_references(
        &self,
        session_id: &str,
        decisions: Vec<(ReferenceKey, DecisionKind)>,
        actor: &str,
    ) -> Result<DecisionReport, DatabaseError> {
        let _guard = self.write_lock().await;
        let conn = self.db().conn();
        let mut session = load_session(conn, session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        if !session.status.accepts_decisions() {
            return Err(not_accepting(&session, "record decisions"));
        }

        let mut applied = Vec::new();
        let mut rejected = Vec::new();
        for (key, decision) in decisions {
            match apply_decision(conn, &mut session, &key, decision, actor).await {
                Ok(()) => applied.push(key),
                Err(e) if e.is_decision_error() => {
                    tracing::warn!(session = %session.id, reference = %key, error = %e, "decision rejected");
                    rejected.push(RejectedDecision {
                        key,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        session.transition(session.decided_status())?;
        store_session(conn, &session).await?;
        tracing::info!(
            session = %session.id,
            applied = applied.len(),
            rejected = rejected.len(),
            status = %session.status,
            "decisions recorded"
        );
        Ok(DecisionReport {
            session_id: session.id.clone(),
            applied,
            rejected,
            status: session.status,
            pending: u32::try_from(session.pending().len()).unwrap_or(u32::MAX),
        })
    }

    /// Give up on a session. No entity data is touched.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidTransition` if the session already
    /// finished.
    pub async fn abandon_import(
        &self,
        session_id: &str,
        actor: &str,
    ) -> Result<ImportSession, DatabaseError> {
        let _guard = self.write_lock().await;
        let conn = self.db().conn();
        let mut session = load_session(conn, session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;
        if session.status.is_terminal() || session.status == ImportStatus::Committing {
            return Err(not_accepting(&session, "abandon"));
        }
        session.transition(ImportStatus::Failed)?;
        session.failure = Some("abandoned".into());
        store_session(conn, &session).await?;
        tracing::info!(session = %session.id, actor, "import abandoned");
        Ok(session)
    }
}

/// Check one decision and store it on the session in memory.
async fn apply_decision(
    conn: &libsql::Connection,
    session: &mut ImportSession,
    key: &ReferenceKey,
    decision: DecisionKind,
    actor: &str,
) -> Result<(), DatabaseError> {
    let slot = session
        .slot(key)
        .ok_or_else(|| DatabaseError::UnknownReference {
            session_id: session.id.clone(),
            key: key.clone(),
        })?;
    let reject = |reason: String| DatabaseError::InvalidDecision {
        key: key.clone(),
        reason,
    };

    let decision = match decision {
        DecisionKind::Link {
            entity_id,
            remember_mapping,
        } => {
            let entity_id = entity_id.trim().to_string();
            if fetch_organization(conn, &entity_id).await?.is_none() {
                return Err(reject(format!("organization {entity_id} does not exist")));
            }
            if remember_mapping {
                let Some(code) = slot.reference.code.as_deref() else {
                    return Err(reject("reference has no code to remember".into()));
                };
                if let Some(conflict) = find_conflict(conn, [code], Some(&entity_id)).await? {
                    return Err(conflict);
                }
            }
            DecisionKind::Link {
                entity_id,
                remember_mapping,
            }
        }
        DecisionKind::Create { organization } => {
            let organization = creation_for(slot, &organization).map_err(|e| reject(e.to_string()))?;
            let identifiers = organization
                .canonical_ref
                .iter()
                .chain(organization.alias_refs.iter())
                .map(String::as_str);
            if let Some(conflict) = find_conflict(conn, identifiers, None).await? {
                return Err(conflict);
            }
            DecisionKind::Create { organization }
        }
        DecisionKind::Skip { reason } => DecisionKind::Skip {
            reason: reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        },
    };

    if let Some(slot) = session.slot_mut(key) {
        slot.decision = Some(OperatorDecision {
            kind: decision,
            decided_by: actor.to_string(),
            decided_at: Utc::now(),
        });
    }
    Ok(())
}

/// Normalize a create request and fill what the reference itself supplies:
/// the code becomes the canonical ref and the document's organisation type
/// the default classification.
fn creation_for(
    slot: &ReferenceSlot,
    requested: &NewOrganization,
) -> Result<NewOrganization, aims_core::errors::CoreError> {
    let mut organization = requested.normalized()?;
    if organization.canonical_ref.is_none() {
        organization.canonical_ref = slot.reference.code.clone();
        organization.alias_refs =
            normalize_alias_refs(&organization.alias_refs, organization.canonical_ref.as_deref());
    }
    if organization.org_type.is_none() {
        organization.org_type = Some(
            slot.type_code
                .as_deref()
                .map(OrgType::from_iati_code)
                .unwrap_or_default(),
        );
    }
    Ok(organization)
}

//! Result shapes returned to callers of the import workflow.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{CommitStatus, ImportStatus};
use crate::reference::ReferenceKey;

/// A fuzzy candidate offered to an operator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CandidateMatch {
    pub entity_id: String,
    pub name: String,
    /// The organization name or name alias that was compared.
    pub matched_by: String,
    pub score: f64,
}

/// An item left out of the commit, and why.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

/// An item whose write failed a constraint during commit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FailedItem {
    pub item: String,
    pub error: String,
}

/// Outcome of `commit_import`.
///
/// `created`, `updated`, `unchanged`, and `deleted` count rows; `skipped` and
/// `failed` name items by path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ImportSummary {
    pub session_id: String,
    pub status: CommitStatus,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub deleted: u32,
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<FailedItem>,
    pub audit_entries_written: u32,
    /// Monetary values recorded without a USD equivalent.
    pub usd_omitted: u32,
    pub total_items: u32,
    /// Infrastructure error that rolled the commit back.
    pub failure: Option<String>,
}

impl ImportSummary {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn skip(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            item: item.into(),
            reason: reason.into(),
        });
    }

    pub fn fail(&mut self, item: impl Into<String>, error: impl Into<String>) {
        self.failed.push(FailedItem {
            item: item.into(),
            error: error.into(),
        });
    }

    /// Copy for persistence with `skipped` and `failed` cut to `limit`
    /// entries each.
    #[must_use]
    pub fn capped(&self, limit: usize) -> Self {
        let mut capped = self.clone();
        capped.skipped.truncate(limit);
        capped.failed.truncate(limit);
        capped
    }
}

/// A decision rejected inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RejectedDecision {
    pub key: ReferenceKey,
    pub error: String,
}

/// Outcome of applying several operator decisions at once.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DecisionReport {
    pub session_id: String,
    pub applied: Vec<ReferenceKey>,
    pub rejected: Vec<RejectedDecision>,
    pub status: ImportStatus,
    pub pending: u32,
}

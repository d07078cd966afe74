//! Status enums, methods, roles, and strategies for AIMS.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! Status enums with state machines provide `allowed_next_states()` to enforce
//! valid transitions at the application layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ResolutionMethod
// ---------------------------------------------------------------------------

/// How a reference became an organization id.
///
/// The resolver only ever produces the first four variants. The operator
/// variants are recorded when a human decision is consumed by the committer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Direct,
    AliasRef,
    FuzzyName,
    FuzzyAlias,
    OperatorLink,
    OperatorCreate,
}

impl ResolutionMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::AliasRef => "alias_ref",
            Self::FuzzyName => "fuzzy_name",
            Self::FuzzyAlias => "fuzzy_alias",
            Self::OperatorLink => "operator_link",
            Self::OperatorCreate => "operator_create",
        }
    }

    /// Whether a human chose this resolution.
    #[must_use]
    pub const fn is_operator(self) -> bool {
        matches!(self, Self::OperatorLink | Self::OperatorCreate)
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ImportStatus
// ---------------------------------------------------------------------------

/// Status of an import session.
///
/// ```text
/// parsing → validating → awaiting_resolution → ready_to_commit → committing → committed
///                      → ready_to_commit ──────→ awaiting_resolution (operator edits a decision)
///                                               committing → awaiting_resolution (alias conflict)
/// any non-terminal → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Parsing,
    Validating,
    AwaitingResolution,
    ReadyToCommit,
    Committing,
    Committed,
    Failed,
}

impl ImportStatus {
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Parsing => &[Self::Validating, Self::Failed],
            Self::Validating => &[Self::AwaitingResolution, Self::ReadyToCommit, Self::Failed],
            Self::AwaitingResolution => &[Self::ReadyToCommit, Self::Failed],
            Self::ReadyToCommit => &[Self::AwaitingResolution, Self::Committing, Self::Failed],
            Self::Committing => &[Self::Committed, Self::AwaitingResolution, Self::Failed],
            Self::Committed | Self::Failed => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// Whether the operator may still record or revise decisions.
    #[must_use]
    pub const fn accepts_decisions(self) -> bool {
        matches!(self, Self::AwaitingResolution | Self::ReadyToCommit)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::AwaitingResolution => "awaiting_resolution",
            Self::ReadyToCommit => "ready_to_commit",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory only; the item proceeds.
    Warning,
    /// Excludes the owning item from commit.
    Blocking,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CollectionKind / CollectionStrategy
// ---------------------------------------------------------------------------

/// Child collections owned by an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Participants,
    Sectors,
    Locations,
    Budgets,
    Transactions,
    Results,
}

impl CollectionKind {
    pub const ALL: [Self; 6] = [
        Self::Participants,
        Self::Sectors,
        Self::Locations,
        Self::Budgets,
        Self::Transactions,
        Self::Results,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Participants => "participants",
            Self::Sectors => "sectors",
            Self::Locations => "locations",
            Self::Budgets => "budgets",
            Self::Transactions => "transactions",
            Self::Results => "results",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the committer writes a child collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategy {
    /// Delete the parent's existing children, then insert the imported set.
    #[default]
    Replace,
    /// Insert without deleting. Repeating a commit duplicates rows.
    Append,
}

impl CollectionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for CollectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PartyRole
// ---------------------------------------------------------------------------

/// Position in a document where an organization reference appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Reporting,
    Funding,
    Accountable,
    Extending,
    Implementing,
    Provider,
    Receiver,
}

impl PartyRole {
    /// Map an IATI `participating-org/@role` value (code or name).
    #[must_use]
    pub fn from_participation(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "funding" => Some(Self::Funding),
            "2" | "accountable" => Some(Self::Accountable),
            "3" | "extending" => Some(Self::Extending),
            "4" | "implementing" => Some(Self::Implementing),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reporting => "reporting",
            Self::Funding => "funding",
            Self::Accountable => "accountable",
            Self::Extending => "extending",
            Self::Implementing => "implementing",
            Self::Provider => "provider",
            Self::Receiver => "receiver",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrgType
// ---------------------------------------------------------------------------

/// Organization classification used by the canonical entity store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    Government,
    Ingo,
    Ngo,
    Multilateral,
    Private,
    Academic,
    #[default]
    Other,
}

impl OrgType {
    /// Map an IATI organisation-type code onto the store's classification.
    #[must_use]
    pub fn from_iati_code(code: &str) -> Self {
        match code.trim() {
            "10" | "11" | "15" => Self::Government,
            "21" => Self::Ingo,
            "22" | "23" => Self::Ngo,
            "30" | "40" => Self::Multilateral,
            "60" | "70" => Self::Private,
            "80" => Self::Academic,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Government => "government",
            Self::Ingo => "ingo",
            Self::Ngo => "ngo",
            Self::Multilateral => "multilateral",
            Self::Private => "private",
            Self::Academic => "academic",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OrgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LocationKind
// ---------------------------------------------------------------------------

/// Geographic disaggregation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Country,
    Region,
}

impl LocationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Region => "region",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CommitStatus
// ---------------------------------------------------------------------------

/// Outcome of an import commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    #[default]
    Committed,
    Failed,
}

impl CommitStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityType / TrailOp
// ---------------------------------------------------------------------------

/// Entity kinds recorded in the commit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Organization,
    Activity,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of mutation recorded in the commit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrailOp {
    Create,
    Update,
    Alias,
}

impl TrailOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Alias => "alias",
        }
    }
}

impl fmt::Display for TrailOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn import_status_forward_path() {
        let path = [
            ImportStatus::Parsing,
            ImportStatus::Validating,
            ImportStatus::AwaitingResolution,
            ImportStatus::ReadyToCommit,
            ImportStatus::Committing,
            ImportStatus::Committed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn import_status_no_backward_except_reentry() {
        assert!(!ImportStatus::Validating.can_transition_to(ImportStatus::Parsing));
        assert!(!ImportStatus::AwaitingResolution.can_transition_to(ImportStatus::Validating));
        assert!(!ImportStatus::Committing.can_transition_to(ImportStatus::ReadyToCommit));
        assert!(ImportStatus::ReadyToCommit.can_transition_to(ImportStatus::AwaitingResolution));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(ImportStatus::Committed.allowed_next_states().is_empty());
        assert!(ImportStatus::Failed.allowed_next_states().is_empty());
        assert!(ImportStatus::Committed.is_terminal());
        assert!(!ImportStatus::Committing.is_terminal());
    }

    #[rstest]
    #[case("10", OrgType::Government)]
    #[case("11", OrgType::Government)]
    #[case("15", OrgType::Government)]
    #[case("21", OrgType::Ingo)]
    #[case("22", OrgType::Ngo)]
    #[case("40", OrgType::Multilateral)]
    #[case("70", OrgType::Private)]
    #[case("80", OrgType::Academic)]
    #[case("99", OrgType::Other)]
    #[case("", OrgType::Other)]
    fn org_type_from_iati_code(#[case] code: &str, #[case] expected: OrgType) {
        assert_eq!(OrgType::from_iati_code(code), expected);
    }

    #[rstest]
    #[case("1", Some(PartyRole::Funding))]
    #[case("Implementing", Some(PartyRole::Implementing))]
    #[case(" 3 ", Some(PartyRole::Extending))]
    #[case("9", None)]
    fn party_role_from_participation(#[case] value: &str, #[case] expected: Option<PartyRole>) {
        assert_eq!(PartyRole::from_participation(value), expected);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&ResolutionMethod::AliasRef).unwrap();
        assert_eq!(json, "\"alias_ref\"");
        let json = serde_json::to_string(&ImportStatus::AwaitingResolution).unwrap();
        assert_eq!(json, "\"awaiting_resolution\"");
    }
}

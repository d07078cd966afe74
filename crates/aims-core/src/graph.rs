//! Intermediate activity graph.
//!
//! Produced by the document parser, annotated by the validation engine, and
//! consumed by the resolver and committer. Items that fail a blocking rule are
//! tombstoned through their `exclusion` field instead of being removed, so the
//! committer can still report why they were skipped.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{PartyRole, Severity};
use crate::reference::Reference;

/// Tombstone marking an item as excluded from commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub reason: String,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub item_path: String,
    pub severity: Severity,
    pub message: String,
}

impl ValidationFinding {
    #[must_use]
    pub fn blocking(item_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item_path: item_path.into(),
            severity: Severity::Blocking,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn warning(item_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item_path: item_path.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// A parsed document: every activity in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedGraph {
    pub activities: Vec<ParsedActivity>,
}

/// One member of a percentage-weighted disaggregation group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub code: Option<String>,
    pub vocabulary: Option<String>,
    pub percentage: Option<f64>,
}

/// A monetary leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub value_date: Option<NaiveDate>,
}

/// A participating organization on an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub role: PartyRole,
    pub reference: Reference,
    /// IATI organisation-type code carried next to the reference.
    pub type_code: Option<String>,
    pub exclusion: Option<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedActivity {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub reporting_org: Option<Reference>,
    pub reporting_org_type: Option<String>,
    pub participants: Vec<Participant>,
    pub status_code: Option<String>,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
    pub default_currency: Option<String>,
    pub sectors: Vec<Allocation>,
    pub recipient_countries: Vec<Allocation>,
    pub recipient_regions: Vec<Allocation>,
    pub budgets: Vec<ParsedBudget>,
    pub transactions: Vec<ParsedTransaction>,
    pub results: Vec<ParsedResult>,
    pub exclusion: Option<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBudget {
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub value: Option<Money>,
    pub exclusion: Option<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub reference: Option<String>,
    pub transaction_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub value: Option<Money>,
    pub description: Option<String>,
    pub provider: Option<Reference>,
    pub receiver: Option<Reference>,
    pub sectors: Vec<Allocation>,
    pub recipient_countries: Vec<Allocation>,
    pub recipient_regions: Vec<Allocation>,
    pub exclusion: Option<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub title: Option<String>,
    pub indicators: Vec<ParsedIndicator>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedIndicator {
    pub title: Option<String>,
    pub measure: Option<String>,
    pub periods: Vec<ParsedPeriod>,
    pub exclusion: Option<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub target: Option<f64>,
    pub actual: Option<f64>,
    pub exclusion: Option<Exclusion>,
}

// ---------------------------------------------------------------------------
// Item paths
// ---------------------------------------------------------------------------

#[must_use]
pub fn activity_path(activity: usize) -> String {
    format!("activity[{activity}]")
}

#[must_use]
pub fn child_path(parent: &str, kind: &str, index: usize) -> String {
    format!("{parent}/{kind}[{index}]")
}

// ---------------------------------------------------------------------------
// Reference collection
// ---------------------------------------------------------------------------

/// One occurrence of an organization reference in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceUse {
    /// Path of the item that owns the reference.
    pub item_path: String,
    pub role: PartyRole,
    pub reference: Reference,
    pub type_code: Option<String>,
}

impl ParsedGraph {
    /// Every non-blank reference carried by an item that is not tombstoned,
    /// in depth-first document order.
    #[must_use]
    pub fn references(&self) -> Vec<ReferenceUse> {
        let mut uses = Vec::new();
        for (a, activity) in self.activities.iter().enumerate() {
            if activity.exclusion.is_some() {
                continue;
            }
            let path = activity_path(a);
            if let Some(reporting) = &activity.reporting_org {
                push_use(
                    &mut uses,
                    &path,
                    PartyRole::Reporting,
                    reporting,
                    activity.reporting_org_type.as_deref(),
                );
            }
            for (p, participant) in activity.participants.iter().enumerate() {
                if participant.exclusion.is_some() {
                    continue;
                }
                push_use(
                    &mut uses,
                    &child_path(&path, "participant", p),
                    participant.role,
                    &participant.reference,
                    participant.type_code.as_deref(),
                );
            }
            for (t, txn) in activity.transactions.iter().enumerate() {
                if txn.exclusion.is_some() {
                    continue;
                }
                let txn_path = child_path(&path, "transaction", t);
                if let Some(provider) = &txn.provider {
                    push_use(&mut uses, &txn_path, PartyRole::Provider, provider, None);
                }
                if let Some(receiver) = &txn.receiver {
                    push_use(&mut uses, &txn_path, PartyRole::Receiver, receiver, None);
                }
            }
        }
        uses
    }

    /// Total number of importable items (activities and their children).
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.activities
            .iter()
            .map(|a| {
                1 + a.participants.len()
                    + a.budgets.len()
                    + a.transactions.len()
                    + a.results
                        .iter()
                        .map(|r| {
                            r.indicators
                                .iter()
                                .map(|i| 1 + i.periods.len())
                                .sum::<usize>()
                        })
                        .sum::<usize>()
            })
            .sum()
    }
}

fn push_use(
    uses: &mut Vec<ReferenceUse>,
    item_path: &str,
    role: PartyRole,
    reference: &Reference,
    type_code: Option<&str>,
) {
    if reference.is_blank() {
        return;
    }
    uses.push(ReferenceUse {
        item_path: item_path.to_string(),
        role,
        reference: reference.clone(),
        type_code: type_code.map(String::from),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(code: &str) -> Reference {
        Reference::new(Some(code), None)
    }

    #[test]
    fn references_skip_tombstoned_items() {
        let graph = ParsedGraph {
            activities: vec![
                ParsedActivity {
                    reporting_org: Some(reference("A")),
                    transactions: vec![
                        ParsedTransaction {
                            provider: Some(reference("B")),
                            ..Default::default()
                        },
                        ParsedTransaction {
                            provider: Some(reference("C")),
                            exclusion: Some(Exclusion {
                                reason: "bad".into(),
                            }),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                ParsedActivity {
                    reporting_org: Some(reference("D")),
                    exclusion: Some(Exclusion {
                        reason: "bad".into(),
                    }),
                    ..Default::default()
                },
            ],
        };

        let codes: Vec<_> = graph
            .references()
            .into_iter()
            .map(|u| (u.item_path, u.reference.code.unwrap_or_default()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("activity[0]".to_string(), "A".to_string()),
                ("activity[0]/transaction[0]".to_string(), "B".to_string()),
            ]
        );
    }

    #[test]
    fn blank_references_are_not_collected() {
        let graph = ParsedGraph {
            activities: vec![ParsedActivity {
                reporting_org: Some(Reference::new(Some("  "), Some(""))),
                ..Default::default()
            }],
        };
        assert!(graph.references().is_empty());
    }
}

//! Parse and validate complete IATI documents.

use aims_core::enums::{PartyRole, Severity};
use aims_core::graph::activity_path;
use aims_ingest::{ParseError, ValidationRules, parse_xml, validate};
use pretty_assertions::assert_eq;

const KOICA: &str = include_str!("fixtures/koica_activities.xml");
const UNCLOSED: &str = include_str!("fixtures/unclosed.xml");

#[test]
fn parses_every_activity_in_order() {
    let graph = parse_xml(KOICA).unwrap();
    let ids: Vec<_> = graph
        .activities
        .iter()
        .map(|a| a.identifier.clone().unwrap_or_default())
        .collect();
    assert_eq!(ids, vec!["KR-GOV-010-2024-001", "KR-GOV-010-2024-002"]);

    let first = &graph.activities[0];
    assert_eq!(first.transactions.len(), 3);
    assert_eq!(first.budgets.len(), 1);
    assert_eq!(first.sectors.len(), 2);
    assert_eq!(first.results[0].indicators[0].periods.len(), 1);
}

#[test]
fn country_split_short_of_100_excludes_only_that_transaction() {
    let report = validate(&parse_xml(KOICA).unwrap(), &ValidationRules::default());

    let blocking: Vec<_> = report.blocking().collect();
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0].item_path, "activity[0]/transaction[1]");
    assert!(blocking[0].message.contains("sum to 95"));

    let first = &report.graph.activities[0];
    assert!(first.exclusion.is_none());
    assert!(first.transactions[0].exclusion.is_none());
    assert!(first.transactions[1].exclusion.is_some());
    assert!(first.transactions[2].exclusion.is_none());
    assert!(report.graph.activities[1].exclusion.is_none());
}

#[test]
fn missing_value_date_is_advisory() {
    let report = validate(&parse_xml(KOICA).unwrap(), &ValidationRules::default());
    let warnings: Vec<_> = report
        .warnings()
        .map(|f| (f.item_path.as_str(), f.severity))
        .collect();
    assert_eq!(
        warnings,
        vec![("activity[0]/transaction[2]", Severity::Warning)]
    );
}

#[test]
fn references_are_collected_from_the_clean_graph() {
    let report = validate(&parse_xml(KOICA).unwrap(), &ValidationRules::default());
    let uses = report.graph.references();

    let reporting: Vec<_> = uses
        .iter()
        .filter(|u| u.role == PartyRole::Reporting)
        .map(|u| u.item_path.clone())
        .collect();
    assert_eq!(reporting, vec![activity_path(0), activity_path(1)]);

    // the excluded transaction's receiver is not offered for resolution
    assert!(
        !uses
            .iter()
            .any(|u| u.item_path == "activity[0]/transaction[1]")
    );
    let provider = uses
        .iter()
        .find(|u| u.role == PartyRole::Provider)
        .unwrap();
    assert_eq!(provider.reference.code.as_deref(), Some("010712"));
    assert_eq!(provider.reference.display_name.as_deref(), Some("KOICA"));
}

#[test]
fn unclosed_document_is_a_parse_error() {
    let err = parse_xml(UNCLOSED).unwrap_err();
    assert!(
        matches!(err, ParseError::Malformed { .. } | ParseError::Unbalanced(_)),
        "got {err:?}"
    );
}

//! IATI activity document parser.
//!
//! Walks a [`RawDocument`] and builds a [`ParsedGraph`]. Organization
//! references keep their raw code and display text; other leaves are coerced
//! to dates, decimals, and floats. Missing optional elements become `None` or
//! empty vectors. Only non-numeric numbers and unreadable dates fail.

use std::str::FromStr;

use aims_core::enums::PartyRole;
use aims_core::graph::{
    Allocation, Money, ParsedActivity, ParsedBudget, ParsedGraph, ParsedIndicator, ParsedPeriod,
    ParsedResult, ParsedTransaction, Participant, activity_path, child_path,
};
use aims_core::reference::Reference;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::document::{Element, RawDocument};
use crate::error::ParseError;

/// Parse a document whose root is `<iati-activities>` or a single
/// `<iati-activity>`.
///
/// # Errors
///
/// Returns `ParseError::UnexpectedRoot` for other roots, and
/// `InvalidNumber` / `InvalidDate` for leaves that cannot be coerced.
pub fn parse(document: &RawDocument) -> Result<ParsedGraph, ParseError> {
    let root = &document.root;
    let elements: Vec<&Element> = match root.name.as_str() {
        "iati-activities" => root.children("iati-activity").collect(),
        "iati-activity" => vec![root],
        other => return Err(ParseError::UnexpectedRoot(other.to_string())),
    };

    let activities = elements
        .into_iter()
        .enumerate()
        .map(|(a, element)| parse_activity(element, &activity_path(a)))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(activities = activities.len(), "parsed IATI document");
    Ok(ParsedGraph { activities })
}

/// Read and parse an XML string in one step.
///
/// # Errors
///
/// Any error from [`RawDocument::from_xml`] or [`parse`].
pub fn parse_xml(xml: &str) -> Result<ParsedGraph, ParseError> {
    parse(&RawDocument::from_xml(xml)?)
}

fn parse_activity(element: &Element, path: &str) -> Result<ParsedActivity, ParseError> {
    let mut activity = ParsedActivity {
        identifier: element.child("iati-identifier").and_then(leaf_text),
        title: element.child("title").and_then(narrative_text),
        status_code: element.child("activity-status").and_then(|e| attr_text(e, "code")),
        default_currency: attr_text(element, "default-currency"),
        ..ParsedActivity::default()
    };

    if let Some(reporting) = element.child("reporting-org") {
        activity.reporting_org = Some(reference(reporting));
        activity.reporting_org_type = attr_text(reporting, "type");
    }

    activity.participants = element
        .children("participating-org")
        .map(|org| Participant {
            role: org
                .attr("role")
                .and_then(PartyRole::from_participation)
                .unwrap_or(PartyRole::Implementing),
            reference: reference(org),
            type_code: attr_text(org, "type"),
            exclusion: None,
        })
        .collect();

    for date in element.children("activity-date") {
        let value = date_attr(date, "iso-date", path)?;
        match date.attr("type").map(str::trim) {
            Some("1" | "start-planned") => activity.planned_start = value,
            Some("3" | "end-planned") => activity.planned_end = value,
            _ => {}
        }
    }

    activity.sectors = allocations(element, "sector", path)?;
    activity.recipient_countries = allocations(element, "recipient-country", path)?;
    activity.recipient_regions = allocations(element, "recipient-region", path)?;

    activity.budgets = element
        .children("budget")
        .enumerate()
        .map(|(b, budget)| parse_budget(budget, &child_path(path, "budget", b)))
        .collect::<Result<_, _>>()?;

    activity.transactions = element
        .children("transaction")
        .enumerate()
        .map(|(t, txn)| parse_transaction(txn, &child_path(path, "transaction", t)))
        .collect::<Result<_, _>>()?;

    activity.results = element
        .children("result")
        .enumerate()
        .map(|(r, result)| parse_result(result, &child_path(path, "result", r)))
        .collect::<Result<_, _>>()?;

    Ok(activity)
}

fn parse_budget(element: &Element, path: &str) -> Result<ParsedBudget, ParseError> {
    Ok(ParsedBudget {
        period_start: element
            .child("period-start")
            .map(|e| date_attr(e, "iso-date", path))
            .transpose()?
            .flatten(),
        period_end: element
            .child("period-end")
            .map(|e| date_attr(e, "iso-date", path))
            .transpose()?
            .flatten(),
        value: element.child("value").map(|v| money(v, path)).transpose()?.flatten(),
        exclusion: None,
    })
}

fn parse_transaction(element: &Element, path: &str) -> Result<ParsedTransaction, ParseError> {
    Ok(ParsedTransaction {
        reference: attr_text(element, "ref"),
        transaction_type: element
            .child("transaction-type")
            .and_then(|e| attr_text(e, "code")),
        date: element
            .child("transaction-date")
            .map(|e| date_attr(e, "iso-date", path))
            .transpose()?
            .flatten(),
        value: element.child("value").map(|v| money(v, path)).transpose()?.flatten(),
        description: element.child("description").and_then(narrative_text),
        provider: element.child("provider-org").map(reference),
        receiver: element.child("receiver-org").map(reference),
        sectors: allocations(element, "sector", path)?,
        recipient_countries: allocations(element, "recipient-country", path)?,
        recipient_regions: allocations(element, "recipient-region", path)?,
        exclusion: None,
    })
}

fn parse_result(element: &Element, path: &str) -> Result<ParsedResult, ParseError> {
    let indicators = element
        .children("indicator")
        .enumerate()
        .map(|(i, indicator)| -> Result<ParsedIndicator, ParseError> {
            let indicator_path = child_path(path, "indicator", i);
            let periods = indicator
                .children("period")
                .enumerate()
                .map(|(p, period)| parse_period(period, &child_path(&indicator_path, "period", p)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedIndicator {
                title: indicator.child("title").and_then(narrative_text),
                measure: attr_text(indicator, "measure"),
                periods,
                exclusion: None,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedResult {
        title: element.child("title").and_then(narrative_text),
        indicators,
    })
}

fn parse_period(element: &Element, path: &str) -> Result<ParsedPeriod, ParseError> {
    let measured = |name: &str| -> Result<Option<f64>, ParseError> {
        element
            .child(name)
            .and_then(|e| e.attr("value"))
            .map(|raw| number(raw, path, name))
            .transpose()
            .map(Option::flatten)
    };
    Ok(ParsedPeriod {
        start: element
            .child("period-start")
            .map(|e| date_attr(e, "iso-date", path))
            .transpose()?
            .flatten(),
        end: element
            .child("period-end")
            .map(|e| date_attr(e, "iso-date", path))
            .transpose()?
            .flatten(),
        target: measured("target")?,
        actual: measured("actual")?,
        exclusion: None,
    })
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// Organization reference with raw `@ref` and raw narrative text.
fn reference(element: &Element) -> Reference {
    Reference {
        code: element.attr("ref").map(String::from),
        display_name: raw_narrative(element),
    }
}

fn raw_narrative(element: &Element) -> Option<String> {
    if let Some(narrative) = element.child("narrative") {
        return Some(narrative.text().to_string());
    }
    let own = element.text();
    (!own.trim().is_empty()).then(|| own.to_string())
}

fn narrative_text(element: &Element) -> Option<String> {
    raw_narrative(element).and_then(|t| non_blank(&t))
}

fn leaf_text(element: &Element) -> Option<String> {
    non_blank(element.text())
}

fn attr_text(element: &Element, key: &str) -> Option<String> {
    element.attr(key).and_then(non_blank)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn allocations(parent: &Element, name: &str, path: &str) -> Result<Vec<Allocation>, ParseError> {
    parent
        .children(name)
        .map(|e| -> Result<Allocation, ParseError> {
            Ok(Allocation {
                code: attr_text(e, "code"),
                vocabulary: attr_text(e, "vocabulary"),
                percentage: e
                    .attr("percentage")
                    .map(|raw| number(raw, path, &format!("{name}/@percentage")))
                    .transpose()?
                    .flatten(),
            })
        })
        .collect()
}

fn money(element: &Element, path: &str) -> Result<Option<Money>, ParseError> {
    let Some(raw) = non_blank(element.text()) else {
        return Ok(None);
    };
    let amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| ParseError::InvalidNumber {
            path: path.to_string(),
            field: "value".into(),
            value: raw.clone(),
        })?;
    Ok(Some(Money {
        amount,
        currency: attr_text(element, "currency"),
        value_date: date_attr(element, "value-date", path)?,
    }))
}

fn number(raw: &str, path: &str, field: &str) -> Result<Option<f64>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ParseError::InvalidNumber {
            path: path.to_string(),
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// ISO date from an attribute. Date-times keep only their date part.
fn date_attr(element: &Element, key: &str, path: &str) -> Result<Option<NaiveDate>, ParseError> {
    let Some(raw) = element.attr(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let date_part = match trimmed.get(..10) {
        Some(head) if trimmed.len() > 10 && trimmed[10..].starts_with('T') => head,
        _ => trimmed,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ParseError::InvalidDate {
            path: path.to_string(),
            field: format!("{}/@{key}", element.name),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn activity_xml(body: &str) -> String {
        format!(
            r#"<iati-activities version="2.03"><iati-activity default-currency="EUR">{body}</iati-activity></iati-activities>"#
        )
    }

    #[test]
    fn references_are_kept_verbatim() {
        let graph = parse_xml(&activity_xml(
            r#"<reporting-org ref=" 010712 " type="10"><narrative>KOREA INTERN. COOPERATION AGENCY </narrative></reporting-org>
               <participating-org role="1" ref="44000" type="40"><narrative>World Bank</narrative></participating-org>
               <participating-org role="implementing"><narrative>Acme Relief</narrative></participating-org>"#,
        ))
        .unwrap();

        let activity = &graph.activities[0];
        assert_eq!(
            activity.reporting_org,
            Some(Reference::new(
                Some(" 010712 "),
                Some("KOREA INTERN. COOPERATION AGENCY ")
            ))
        );
        assert_eq!(activity.reporting_org_type.as_deref(), Some("10"));
        assert_eq!(activity.participants.len(), 2);
        assert_eq!(activity.participants[0].role, PartyRole::Funding);
        assert_eq!(activity.participants[0].type_code.as_deref(), Some("40"));
        assert_eq!(activity.participants[1].role, PartyRole::Implementing);
        assert_eq!(activity.participants[1].reference.code, None);
    }

    #[test]
    fn missing_groups_are_empty_not_absent() {
        let graph = parse_xml(&activity_xml("<iati-identifier>XM-1</iati-identifier>")).unwrap();
        let activity = &graph.activities[0];
        assert!(activity.sectors.is_empty());
        assert!(activity.recipient_countries.is_empty());
        assert!(activity.transactions.is_empty());
        assert_eq!(activity.default_currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn transaction_leaves_are_coerced() {
        let graph = parse_xml(&activity_xml(
            r#"<transaction ref="t-1">
                 <transaction-type code="3"/>
                 <transaction-date iso-date="2024-02-15"/>
                 <value currency="USD" value-date="2024-02-01T00:00:00">1500000.50</value>
                 <provider-org ref="KR-GOV-010"><narrative>KOICA</narrative></provider-org>
                 <recipient-country code="KH" percentage="60"/>
                 <recipient-country code="LA" percentage="40.0"/>
               </transaction>"#,
        ))
        .unwrap();

        let txn = &graph.activities[0].transactions[0];
        assert_eq!(txn.transaction_type.as_deref(), Some("3"));
        assert_eq!(txn.date, NaiveDate::from_ymd_opt(2024, 2, 15));
        let value = txn.value.as_ref().unwrap();
        assert_eq!(value.amount, Decimal::from_str("1500000.50").unwrap());
        assert_eq!(value.currency.as_deref(), Some("USD"));
        assert_eq!(value.value_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(txn.recipient_countries.len(), 2);
        assert_eq!(txn.recipient_countries[1].percentage, Some(40.0));
        assert!(txn.receiver.is_none());
    }

    #[test]
    fn non_numeric_value_is_a_parse_error() {
        let err = parse_xml(&activity_xml(
            r#"<budget><value currency="USD">lots</value></budget>"#,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidNumber {
                path: "activity[0]/budget[0]".into(),
                field: "value".into(),
                value: "lots".into(),
            }
        );
    }

    #[test]
    fn non_numeric_percentage_is_a_parse_error() {
        let err = parse_xml(&activity_xml(r#"<sector code="11220" percentage="half"/>"#))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn bad_date_is_a_parse_error() {
        let err = parse_xml(&activity_xml(
            r#"<activity-date type="1" iso-date="15/02/2024"/>"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidDate { .. }));
    }

    #[test]
    fn empty_value_is_missing_not_an_error() {
        let graph = parse_xml(&activity_xml(r"<budget><value> </value></budget>")).unwrap();
        assert!(graph.activities[0].budgets[0].value.is_none());
    }

    #[test]
    fn results_indicators_and_periods() {
        let graph = parse_xml(&activity_xml(
            r#"<result type="1"><title><narrative>Schools built</narrative></title>
                 <indicator measure="1"><title><narrative>Classrooms</narrative></title>
                   <period><period-start iso-date="2024-01-01"/><period-end iso-date="2024-12-31"/>
                     <target value="40"/><actual value="31.5"/></period>
                 </indicator>
               </result>"#,
        ))
        .unwrap();

        let result = &graph.activities[0].results[0];
        assert_eq!(result.title.as_deref(), Some("Schools built"));
        let indicator = &result.indicators[0];
        assert_eq!(indicator.measure.as_deref(), Some("1"));
        assert_eq!(indicator.periods[0].target, Some(40.0));
        assert_eq!(indicator.periods[0].actual, Some(31.5));
    }

    #[test]
    fn unexpected_root_is_rejected() {
        let err = parse_xml("<iati-organisations/>").unwrap_err();
        assert_eq!(err, ParseError::UnexpectedRoot("iati-organisations".into()));
    }

    #[test]
    fn single_activity_root_is_accepted() {
        let graph =
            parse_xml("<iati-activity><iati-identifier> XM-9 </iati-identifier></iati-activity>")
                .unwrap();
        assert_eq!(graph.activities[0].identifier.as_deref(), Some("XM-9"));
    }
}

//! Validation engine.
//!
//! One depth-first pass over a copy of the graph. Each blocking finding
//! tombstones the item that owns it (never its siblings, never the batch);
//! warnings are recorded and the item proceeds. References are trimmed on the
//! way through. Running the pass again over its own output yields the same
//! findings.

use std::collections::HashMap;

use aims_core::graph::{
    Allocation, Exclusion, Money, ParsedActivity, ParsedBudget, ParsedGraph, ParsedPeriod,
    ParsedTransaction, ValidationFinding, activity_path, child_path,
};
use chrono::NaiveDate;

/// Numeric limits applied by the rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationRules {
    /// Allowed deviation from 100 for a percentage group.
    pub percentage_tolerance: f64,
    /// Longest budget or result period, counting both end days.
    pub max_period_days: i64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            percentage_tolerance: 0.01,
            max_period_days: 366,
        }
    }
}

/// Validated graph plus every finding, in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub graph: ParsedGraph,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    #[must_use]
    pub fn blocking(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.is_blocking())
    }

    #[must_use]
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| !f.is_blocking())
    }
}

/// Validate `graph` against `rules`.
#[must_use]
pub fn validate(graph: &ParsedGraph, rules: &ValidationRules) -> ValidationReport {
    let mut graph = graph.clone();
    let mut pass = Pass {
        rules,
        findings: Vec::new(),
        identifiers: HashMap::new(),
    };
    for (a, activity) in graph.activities.iter_mut().enumerate() {
        pass.activity(activity, &activity_path(a));
    }

    let blocking = pass.findings.iter().filter(|f| f.is_blocking()).count();
    tracing::debug!(
        findings = pass.findings.len(),
        blocking,
        "validated activity graph"
    );
    ValidationReport {
        graph,
        findings: pass.findings,
    }
}

struct Pass<'r> {
    rules: &'r ValidationRules,
    findings: Vec<ValidationFinding>,
    /// First path seen for each activity identifier.
    identifiers: HashMap<String, String>,
}

impl Pass<'_> {
    fn activity(&mut self, activity: &mut ParsedActivity, path: &str) {
        normalize_references(activity);
        let mut problems = Vec::new();

        match activity.identifier.as_deref().map(str::trim) {
            None | Some("") => problems.push("missing iati-identifier".to_string()),
            Some(identifier) => {
                if let Some(first) = self.identifiers.get(identifier) {
                    problems.push(format!(
                        "duplicate iati-identifier {identifier} (first used by {first})"
                    ));
                } else {
                    self.identifiers
                        .insert(identifier.to_string(), path.to_string());
                }
            }
        }
        if activity.title.is_none() {
            problems.push("missing title".into());
        }
        if let (Some(start), Some(end)) = (activity.planned_start, activity.planned_end) {
            if end < start {
                problems.push(format!("planned end {end} precedes planned start {start}"));
            }
        }
        problems.extend(self.disaggregation(
            &activity.sectors,
            &activity.recipient_countries,
            &activity.recipient_regions,
        ));
        if activity.sectors.is_empty() {
            self.warn(path, "activity has no sector");
        }
        self.block(path, &mut activity.exclusion, problems);

        let default_currency = activity.default_currency.clone();

        for (p, participant) in activity.participants.iter_mut().enumerate() {
            if participant.reference.is_blank() {
                self.block(
                    &child_path(path, "participant", p),
                    &mut participant.exclusion,
                    vec!["participating-org has neither ref nor name".into()],
                );
            }
        }

        for (b, budget) in activity.budgets.iter_mut().enumerate() {
            self.budget(budget, &child_path(path, "budget", b), default_currency.as_deref());
        }

        for (t, txn) in activity.transactions.iter_mut().enumerate() {
            self.transaction(
                txn,
                &child_path(path, "transaction", t),
                default_currency.as_deref(),
            );
        }

        for (r, result) in activity.results.iter_mut().enumerate() {
            let result_path = child_path(path, "result", r);
            for (i, indicator) in result.indicators.iter_mut().enumerate() {
                let indicator_path = child_path(&result_path, "indicator", i);
                if indicator.title.is_none() {
                    self.block(
                        &indicator_path,
                        &mut indicator.exclusion,
                        vec!["indicator is missing its title".into()],
                    );
                }
                for (p, period) in indicator.periods.iter_mut().enumerate() {
                    self.period(period, &child_path(&indicator_path, "period", p));
                }
            }
        }
    }

    fn budget(&mut self, budget: &mut ParsedBudget, path: &str, default_currency: Option<&str>) {
        let mut problems = Vec::new();
        if budget.period_start.is_none() {
            problems.push("budget is missing period-start".into());
        }
        if budget.period_end.is_none() {
            problems.push("budget is missing period-end".into());
        }
        if budget.value.is_none() {
            problems.push("budget is missing its value".into());
        }
        problems.extend(self.span(budget.period_start, budget.period_end));
        self.money_warnings(path, budget.value.as_ref(), default_currency);
        self.block(path, &mut budget.exclusion, problems);
    }

    fn transaction(
        &mut self,
        txn: &mut ParsedTransaction,
        path: &str,
        default_currency: Option<&str>,
    ) {
        let mut problems = Vec::new();
        if txn.transaction_type.is_none() {
            problems.push("transaction is missing transaction-type".into());
        }
        if txn.date.is_none() {
            problems.push("transaction is missing transaction-date".into());
        }
        if txn.value.is_none() {
            problems.push("transaction is missing its value".into());
        }
        problems.extend(self.disaggregation(
            &txn.sectors,
            &txn.recipient_countries,
            &txn.recipient_regions,
        ));
        self.money_warnings(path, txn.value.as_ref(), default_currency);
        self.block(path, &mut txn.exclusion, problems);
    }

    fn period(&mut self, period: &mut ParsedPeriod, path: &str) {
        let mut problems = Vec::new();
        if period.start.is_none() {
            problems.push("period is missing period-start".into());
        }
        if period.end.is_none() {
            problems.push("period is missing period-end".into());
        }
        problems.extend(self.span(period.start, period.end));
        self.block(path, &mut period.exclusion, problems);
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    /// Percentage-sum and range rules per group, plus country/region
    /// exclusivity.
    fn disaggregation(
        &self,
        sectors: &[Allocation],
        countries: &[Allocation],
        regions: &[Allocation],
    ) -> Vec<String> {
        let mut problems = Vec::new();
        problems.extend(self.percentages("sector", sectors));
        problems.extend(self.percentages("recipient-country", countries));
        problems.extend(self.percentages("recipient-region", regions));
        if !countries.is_empty() && !regions.is_empty() {
            problems.push("recipient-country and recipient-region are mutually exclusive".into());
        }
        problems
    }

    fn percentages(&self, label: &str, group: &[Allocation]) -> Vec<String> {
        let mut problems = Vec::new();
        for member in group {
            if let Some(pct) = member.percentage {
                if !(0.0..=100.0).contains(&pct) {
                    problems.push(format!(
                        "{label} {} has percentage {pct} outside 0-100",
                        member.code.as_deref().unwrap_or("?")
                    ));
                }
            }
        }
        if group.iter().any(|m| m.percentage.is_some()) {
            let sum: f64 = group.iter().filter_map(|m| m.percentage).sum();
            if (sum - 100.0).abs() > self.rules.percentage_tolerance + f64::EPSILON * 100.0 {
                problems.push(format!(
                    "{label} percentages sum to {}, expected 100",
                    display_number(sum)
                ));
            }
        }
        problems
    }

    fn span(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<String> {
        let (Some(start), Some(end)) = (start, end) else {
            return Vec::new();
        };
        if end < start {
            return vec![format!("period end {end} precedes start {start}")];
        }
        let days = (end - start).num_days() + 1;
        if days > self.rules.max_period_days {
            return vec![format!(
                "period spans {days} days, longer than {} allowed",
                self.rules.max_period_days
            )];
        }
        Vec::new()
    }

    fn money_warnings(&mut self, path: &str, money: Option<&Money>, default_currency: Option<&str>) {
        let Some(money) = money else {
            return;
        };
        if money.currency.is_none() && default_currency.is_none() {
            self.warn(path, "value has no currency and the activity has no default-currency");
        }
        if money.value_date.is_none() {
            self.warn(path, "value has no value-date for currency conversion");
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record each problem as a blocking finding and tombstone the item with
    /// the first one, unless it is already tombstoned.
    fn block(&mut self, path: &str, exclusion: &mut Option<Exclusion>, problems: Vec<String>) {
        if problems.is_empty() {
            return;
        }
        if exclusion.is_none() {
            *exclusion = Some(Exclusion {
                reason: problems[0].clone(),
            });
        }
        self.findings.extend(
            problems
                .into_iter()
                .map(|message| ValidationFinding::blocking(path, message)),
        );
    }

    fn warn(&mut self, path: &str, message: &str) {
        self.findings.push(ValidationFinding::warning(path, message));
    }
}

fn normalize_references(activity: &mut ParsedActivity) {
    if let Some(reporting) = activity.reporting_org.as_mut() {
        *reporting = reporting.normalized();
    }
    for participant in &mut activity.participants {
        participant.reference = participant.reference.normalized();
    }
    for txn in &mut activity.transactions {
        if let Some(provider) = txn.provider.as_mut() {
            *provider = provider.normalized();
        }
        if let Some(receiver) = txn.receiver.as_mut() {
            *receiver = receiver.normalized();
        }
    }
    if let Some(identifier) = activity.identifier.as_mut() {
        *identifier = identifier.trim().to_string();
    }
}

fn display_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::enums::Severity;
    use aims_core::graph::{ParsedIndicator, ParsedResult};
    use aims_core::reference::Reference;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn usd(amount: i64) -> Option<Money> {
        Some(Money {
            amount: Decimal::from(amount),
            currency: Some("USD".into()),
            value_date: date(2024, 1, 1),
        })
    }

    fn split(percentages: &[f64]) -> Vec<Allocation> {
        percentages
            .iter()
            .enumerate()
            .map(|(i, p)| Allocation {
                code: Some(format!("C{i}")),
                vocabulary: None,
                percentage: Some(*p),
            })
            .collect()
    }

    fn transaction() -> ParsedTransaction {
        ParsedTransaction {
            transaction_type: Some("3".into()),
            date: date(2024, 2, 1),
            value: usd(1000),
            ..ParsedTransaction::default()
        }
    }

    fn activity(identifier: &str) -> ParsedActivity {
        ParsedActivity {
            identifier: Some(identifier.into()),
            title: Some("Rural schools".into()),
            sectors: split(&[100.0]),
            ..ParsedActivity::default()
        }
    }

    fn blocking_paths(report: &ValidationReport) -> Vec<String> {
        report.blocking().map(|f| f.item_path.clone()).collect()
    }

    #[test]
    fn percentage_shortfall_excludes_only_that_transaction() {
        let mut a = activity("XM-1");
        let mut bad = transaction();
        bad.recipient_countries = split(&[40.0, 35.0, 20.0]);
        a.transactions = vec![transaction(), bad, transaction()];
        let graph = ParsedGraph { activities: vec![a] };

        let report = validate(&graph, &ValidationRules::default());

        assert_eq!(blocking_paths(&report), vec!["activity[0]/transaction[1]"]);
        let finding = report.blocking().next().unwrap();
        assert_eq!(
            finding.message,
            "recipient-country percentages sum to 95, expected 100"
        );
        let txns = &report.graph.activities[0].transactions;
        assert!(txns[0].exclusion.is_none());
        assert!(txns[1].exclusion.is_some());
        assert!(txns[2].exclusion.is_none());
        assert!(report.graph.activities[0].exclusion.is_none());
    }

    #[rstest]
    #[case::exact(&[60.0, 40.0], true)]
    #[case::within_tolerance(&[33.33, 33.33, 33.34], true)]
    #[case::tolerance_edge(&[50.0, 49.995], true)]
    #[case::short(&[50.0, 49.9], false)]
    #[case::over(&[70.0, 40.0], false)]
    #[case::negative(&[120.0, -20.0], false)]
    fn sector_percentage_groups(#[case] percentages: &[f64], #[case] ok: bool) {
        let mut a = activity("XM-1");
        a.sectors = split(percentages);
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(report.graph.activities[0].exclusion.is_none(), ok);
    }

    #[test]
    fn group_without_percentages_is_not_summed() {
        let mut a = activity("XM-1");
        a.recipient_countries = vec![Allocation {
            code: Some("KH".into()),
            ..Allocation::default()
        }];
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(report.blocking().count(), 0);
    }

    #[test]
    fn country_and_region_together_are_blocking() {
        let mut a = activity("XM-1");
        a.recipient_countries = split(&[100.0]);
        a.recipient_regions = split(&[100.0]);
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(blocking_paths(&report), vec!["activity[0]"]);
        assert!(report.findings[0].message.contains("mutually exclusive"));
    }

    #[test]
    fn missing_transaction_fields_are_blocking_per_item() {
        let mut a = activity("XM-1");
        a.transactions = vec![
            ParsedTransaction {
                value: None,
                ..transaction()
            },
            transaction(),
        ];
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(blocking_paths(&report), vec!["activity[0]/transaction[0]"]);
    }

    #[rstest]
    #[case::reversed(date(2024, 6, 1), date(2024, 5, 31), false)]
    #[case::leap_year(date(2024, 1, 1), date(2024, 12, 31), true)]
    #[case::too_long(date(2024, 1, 1), date(2025, 1, 1), false)]
    #[case::single_day(date(2024, 1, 1), date(2024, 1, 1), true)]
    fn budget_period_rules(
        #[case] start: Option<NaiveDate>,
        #[case] end: Option<NaiveDate>,
        #[case] ok: bool,
    ) {
        let mut a = activity("XM-1");
        a.budgets = vec![ParsedBudget {
            period_start: start,
            period_end: end,
            value: usd(10),
            exclusion: None,
        }];
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(report.graph.activities[0].budgets[0].exclusion.is_none(), ok);
    }

    #[test]
    fn result_period_reversed_is_blocking_for_period_only() {
        let mut a = activity("XM-1");
        a.results = vec![ParsedResult {
            title: Some("Outcome".into()),
            indicators: vec![ParsedIndicator {
                title: Some("Enrolment".into()),
                measure: Some("1".into()),
                periods: vec![
                    ParsedPeriod {
                        start: date(2024, 1, 1),
                        end: date(2023, 1, 1),
                        ..ParsedPeriod::default()
                    },
                    ParsedPeriod {
                        start: date(2024, 1, 1),
                        end: date(2024, 6, 30),
                        ..ParsedPeriod::default()
                    },
                ],
                exclusion: None,
            }],
        }];
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(
            blocking_paths(&report),
            vec!["activity[0]/result[0]/indicator[0]/period[0]"]
        );
    }

    #[test]
    fn missing_value_date_is_only_a_warning() {
        let mut a = activity("XM-1");
        let mut txn = transaction();
        if let Some(value) = txn.value.as_mut() {
            value.value_date = None;
        }
        a.transactions = vec![txn];
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(report.blocking().count(), 0);
        let warning = report.warnings().next().unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(warning.item_path, "activity[0]/transaction[0]");
    }

    #[test]
    fn duplicate_identifier_blocks_second_activity() {
        let graph = ParsedGraph {
            activities: vec![activity("XM-1"), activity(" XM-1 ")],
        };
        let report = validate(&graph, &ValidationRules::default());
        assert_eq!(blocking_paths(&report), vec!["activity[1]"]);
        assert!(report.findings[0].message.contains("first used by activity[0]"));
    }

    #[test]
    fn references_are_trimmed() {
        let mut a = activity("XM-1");
        a.reporting_org = Some(Reference::new(Some(" 010712 "), Some(" KOICA ")));
        let report = validate(
            &ParsedGraph { activities: vec![a] },
            &ValidationRules::default(),
        );
        assert_eq!(
            report.graph.activities[0].reporting_org,
            Some(Reference::new(Some("010712"), Some("KOICA")))
        );
    }

    #[test]
    fn validation_is_idempotent() {
        let mut a = activity("XM-1");
        let mut bad = transaction();
        bad.sectors = split(&[40.0, 35.0, 20.0]);
        a.transactions = vec![bad];
        a.recipient_countries = split(&[50.0, 50.0]);
        a.recipient_regions = split(&[100.0]);
        let graph = ParsedGraph {
            activities: vec![a, activity("XM-2")],
        };
        let rules = ValidationRules::default();

        let first = validate(&graph, &rules);
        let again = validate(&graph, &rules);
        let revalidated = validate(&first.graph, &rules);

        assert_eq!(first, again);
        assert_eq!(first.findings, revalidated.findings);
        assert_eq!(first.graph, revalidated.graph);
    }
}

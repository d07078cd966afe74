//! Import Committer.
//!
//! Writes a ready session in one transaction. Each activity and each child
//! item runs under its own savepoint: a constraint violation rolls back only
//! that item and is reported in the summary, while any other error rolls the
//! whole transaction back. An identifier conflict or a stale decision sends
//! the session back to the operator instead.

use std::collections::HashMap;

use aims_core::entities::{ImportSession, NewAuditEntry, ReferenceSlot, SlotOutcome};
use aims_core::enums::{
    CollectionKind, CollectionStrategy, CommitStatus, EntityType, ImportStatus, LocationKind,
    PartyRole, ResolutionMethod, TrailOp,
};
use aims_core::graph::{
    Allocation, Money, ParsedActivity, ParsedIndicator, ParsedPeriod, ParsedTransaction,
    activity_path, child_path,
};
use aims_core::ids::{
    PREFIX_ACTIVITY, PREFIX_BUDGET, PREFIX_INDICATOR, PREFIX_LOCATION, PREFIX_PARTICIPANT,
    PREFIX_SECTOR, PREFIX_TRANSACTION,
};
use aims_core::rates::{RateProvider, to_usd};
use aims_core::reference::{Reference, ReferenceKey};
use aims_core::resolution::{ResolutionResult, UnresolvedReason};
use aims_core::responses::ImportSummary;
use aims_core::trail::TrailOperation;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::error::DatabaseError;
use crate::generate_id;
use crate::helpers::{collection_table, date_text, get_opt_string};
use crate::repos::audit::insert_audit;
use crate::repos::import_session::{load_session, store_session};
use crate::repos::organization::{
    IdentifierKind, claim_identifier, fetch_organization, insert_organization, next_alias_position,
};
use crate::service::AimsService;

/// What a session reference settled to during this commit.
enum Target {
    Entity(String),
    Skipped(String),
}

/// An organization position on an item, after settlement.
enum Party {
    Absent,
    Entity(String),
    Skipped(String),
}

enum Change {
    Created,
    Updated,
    Unchanged,
}

/// One child row to write, with the content fingerprint used to detect an
/// unchanged collection under the replace strategy.
struct PlannedChild<'g> {
    path: String,
    fingerprint: String,
    row: ChildRow<'g>,
}

enum ChildRow<'g> {
    Participant {
        organization_id: String,
        role: PartyRole,
    },
    Sector(&'g Allocation),
    Location {
        kind: LocationKind,
        allocation: &'g Allocation,
    },
    Budget {
        start: NaiveDate,
        end: NaiveDate,
        money: &'g Money,
        currency: Option<String>,
        usd: Result<Decimal, String>,
    },
    Transaction {
        txn: &'g ParsedTransaction,
        transaction_type: &'g str,
        date: NaiveDate,
        money: &'g Money,
        currency: Option<String>,
        usd: Result<Decimal, String>,
        provider: Option<String>,
        receiver: Option<String>,
    },
    Indicator {
        result_title: Option<&'g str>,
        indicator: &'g ParsedIndicator,
        title: &'g str,
        periods: Vec<(NaiveDate, NaiveDate, &'g ParsedPeriod)>,
    },
}

impl ChildRow<'_> {
    fn usd_omission(&self) -> Option<&str> {
        match self {
            Self::Budget { usd: Err(why), .. } | Self::Transaction { usd: Err(why), .. } => {
                Some(why.as_str())
            }
            _ => None,
        }
    }
}

/// State threaded through one commit.
struct CommitRun<'s> {
    session: &'s ImportSession,
    actor: &'s str,
    summary: ImportSummary,
    trail: Vec<TrailOperation>,
    targets: HashMap<ReferenceKey, Target>,
}

impl<'s> CommitRun<'s> {
    fn new(session: &'s ImportSession, actor: &'s str) -> Self {
        let mut summary = ImportSummary::new(session.id.as_str());
        summary.total_items = u32::try_from(session.graph.item_count()).unwrap_or(u32::MAX);
        Self {
            session,
            actor,
            summary,
            trail: Vec::new(),
            targets: HashMap::new(),
        }
    }

    fn record(&mut self, op: TrailOp, entity: EntityType, id: &str, data: serde_json::Value) {
        self.trail.push(TrailOperation {
            v: 1,
            ts: Utc::now().to_rfc3339(),
            ses: self.session.id.clone(),
            op,
            entity,
            id: id.to_string(),
            data,
        });
    }

    fn party(&self, reference: Option<&Reference>) -> Result<Party, DatabaseError> {
        let Some(reference) = reference.filter(|r| !r.is_blank()) else {
            return Ok(Party::Absent);
        };
        match self.targets.get(&reference.key()) {
            Some(Target::Entity(id)) => Ok(Party::Entity(id.clone())),
            Some(Target::Skipped(reason)) => Ok(Party::Skipped(format!(
                "organization {reference} was skipped: {reason}"
            ))),
            None => Err(DatabaseError::InvalidState(format!(
                "reference {reference} has no slot in session {}",
                self.session.id
            ))),
        }
    }

    fn plan_participants(
        &mut self,
        path: &str,
        activity: &'s ParsedActivity,
    ) -> Result<Vec<PlannedChild<'s>>, DatabaseError> {
        let mut planned = Vec::new();
        for (p, participant) in activity.participants.iter().enumerate() {
            let item = child_path(path, "participant", p);
            if let Some(exclusion) = &participant.exclusion {
                self.summary.skip(item, &exclusion.reason);
                continue;
            }
            let organization_id = match self.party(Some(&participant.reference))? {
                Party::Entity(id) => id,
                Party::Skipped(reason) => {
                    self.summary.skip(item, reason);
                    continue;
                }
                Party::Absent => {
                    self.summary.skip(item, "participant has no organization reference");
                    continue;
                }
            };
            planned.push(PlannedChild {
                fingerprint: json!({"org": organization_id, "role": participant.role}).to_string(),
                path: item,
                row: ChildRow::Participant {
                    organization_id,
                    role: participant.role,
                },
            });
        }
        Ok(planned)
    }

    fn plan_budgets(
        &mut self,
        path: &str,
        activity: &'s ParsedActivity,
        rates: &dyn RateProvider,
    ) -> Vec<PlannedChild<'s>> {
        let mut planned = Vec::new();
        for (b, budget) in activity.budgets.iter().enumerate() {
            let item = child_path(path, "budget", b);
            if let Some(exclusion) = &budget.exclusion {
                self.summary.skip(item, &exclusion.reason);
                continue;
            }
            let (Some(start), Some(end), Some(money)) =
                (budget.period_start, budget.period_end, budget.value.as_ref())
            else {
                self.summary.skip(item, "budget needs a period and a value");
                continue;
            };
            let currency = effective_currency(money, activity);
            planned.push(PlannedChild {
                fingerprint: json!({
                    "start": start,
                    "end": end,
                    "amount": money.amount.to_string(),
                    "currency": currency,
                    "value_date": money.value_date,
                })
                .to_string(),
                path: item,
                row: ChildRow::Budget {
                    start,
                    end,
                    money,
                    usd: usd_value(rates, money, currency.as_deref(), Some(start)),
                    currency,
                },
            });
        }
        planned
    }

    fn plan_transactions(
        &mut self,
        path: &str,
        activity: &'s ParsedActivity,
        rates: &dyn RateProvider,
    ) -> Result<Vec<PlannedChild<'s>>, DatabaseError> {
        let mut planned = Vec::new();
        for (t, txn) in activity.transactions.iter().enumerate() {
            let item = child_path(path, "transaction", t);
            if let Some(exclusion) = &txn.exclusion {
                self.summary.skip(item, &exclusion.reason);
                continue;
            }
            let (Some(transaction_type), Some(date), Some(money)) =
                (txn.transaction_type.as_deref(), txn.date, txn.value.as_ref())
            else {
                self.summary.skip(item, "transaction needs a type, a date, and a value");
                continue;
            };
            let provider = match self.party(txn.provider.as_ref())? {
                Party::Skipped(reason) => {
                    self.summary.skip(item, format!("provider {reason}"));
                    continue;
                }
                Party::Entity(id) => Some(id),
                Party::Absent => None,
            };
            let receiver = match self.party(txn.receiver.as_ref())? {
                Party::Skipped(reason) => {
                    self.summary.skip(item, format!("receiver {reason}"));
                    continue;
                }
                Party::Entity(id) => Some(id),
                Party::Absent => None,
            };
            let currency = effective_currency(money, activity);
            planned.push(PlannedChild {
                fingerprint: json!({
                    "ref": txn.reference,
                    "type": transaction_type,
                    "date": date,
                    "amount": money.amount.to_string(),
                    "currency": currency,
                    "value_date": money.value_date,
                    "description": txn.description,
                    "provider": provider,
                    "receiver": receiver,
                    "sectors": txn.sectors,
                    "countries": txn.recipient_countries,
                    "regions": txn.recipient_regions,
                })
                .to_string(),
                path: item,
                row: ChildRow::Transaction {
                    txn,
                    transaction_type,
                    date,
                    money,
                    usd: usd_value(rates, money, currency.as_deref(), Some(date)),
                    currency,
                    provider,
                    receiver,
                },
            });
        }
        Ok(planned)
    }

    fn plan_results(&mut self, path: &str, activity: &'s ParsedActivity) -> Vec<PlannedChild<'s>> {
        let mut planned = Vec::new();
        for (r, result) in activity.results.iter().enumerate() {
            let result_path = child_path(path, "result", r);
            for (i, indicator) in result.indicators.iter().enumerate() {
                let item = child_path(&result_path, "indicator", i);
                if let Some(exclusion) = &indicator.exclusion {
                    self.summary.skip(item, &exclusion.reason);
                    continue;
                }
                let Some(title) = indicator.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
                else {
                    self.summary.skip(item, "indicator has no title");
                    continue;
                };
                let mut periods = Vec::new();
                for (p, period) in indicator.periods.iter().enumerate() {
                    let period_path = child_path(&item, "period", p);
                    if let Some(exclusion) = &period.exclusion {
                        self.summary.skip(period_path, &exclusion.reason);
                        continue;
                    }
                    let (Some(start), Some(end)) = (period.start, period.end) else {
                        self.summary.skip(period_path, "period needs a start and an end");
                        continue;
                    };
                    periods.push((start, end, period));
                }
                let period_prints: Vec<_> = periods
                    .iter()
                    .map(|(start, end, p)| json!([start, end, p.target, p.actual]))
                    .collect();
                planned.push(PlannedChild {
                    fingerprint: json!({
                        "result": result.title,
                        "title": title,
                        "measure": indicator.measure,
                        "periods": period_prints,
                    })
                    .to_string(),
                    path: item,
                    row: ChildRow::Indicator {
                        result_title: result.title.as_deref(),
                        indicator,
                        title,
                        periods,
                    },
                });
            }
        }
        planned
    }
}

fn plan_sectors<'g>(path: &str, activity: &'g ParsedActivity) -> Vec<PlannedChild<'g>> {
    activity
        .sectors
        .iter()
        .enumerate()
        .map(|(s, allocation)| PlannedChild {
            path: child_path(path, "sector", s),
            fingerprint: json!(allocation).to_string(),
            row: ChildRow::Sector(allocation),
        })
        .collect()
}

fn plan_locations<'g>(path: &str, activity: &'g ParsedActivity) -> Vec<PlannedChild<'g>> {
    let countries = activity
        .recipient_countries
        .iter()
        .enumerate()
        .map(|(c, a)| (child_path(path, "recipient-country", c), LocationKind::Country, a));
    let regions = activity
        .recipient_regions
        .iter()
        .enumerate()
        .map(|(r, a)| (child_path(path, "recipient-region", r), LocationKind::Region, a));
    countries
        .chain(regions)
        .map(|(item, kind, allocation)| PlannedChild {
            path: item,
            fingerprint: json!({"kind": kind, "allocation": allocation}).to_string(),
            row: ChildRow::Location { kind, allocation },
        })
        .collect()
}

fn effective_currency(money: &Money, activity: &ParsedActivity) -> Option<String> {
    money
        .currency
        .as_deref()
        .or(activity.default_currency.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
}

/// USD value at the value date, falling back to the item's own date.
fn usd_value(
    rates: &dyn RateProvider,
    money: &Money,
    currency: Option<&str>,
    fallback_date: Option<NaiveDate>,
) -> Result<Decimal, String> {
    let Some(currency) = currency else {
        return Err("no currency".into());
    };
    let Some(as_of) = money.value_date.or(fallback_date) else {
        return Err("no value date".into());
    };
    to_usd(rates, money.amount, currency, as_of).map_err(|e| e.to_string())
}

fn activity_payload(
    identifier: &str,
    activity: &ParsedActivity,
    reporting: Option<&str>,
) -> serde_json::Value {
    json!({
        "iati_identifier": identifier,
        "title": activity.title,
        "reporting_org_id": reporting,
        "status_code": activity.status_code,
        "planned_start": activity.planned_start,
        "planned_end": activity.planned_end,
        "default_currency": activity.default_currency,
    })
}

async fn savepoint(conn: &libsql::Connection, name: &str) -> Result<(), DatabaseError> {
    conn.execute(&format!("SAVEPOINT {name}"), ()).await?;
    Ok(())
}

async fn release(conn: &libsql::Connection, name: &str) -> Result<(), DatabaseError> {
    conn.execute(&format!("RELEASE {name}"), ()).await?;
    Ok(())
}

async fn roll_back_to(conn: &libsql::Connection, name: &str) -> Result<(), DatabaseError> {
    conn.execute(&format!("ROLLBACK TO {name}"), ()).await?;
    release(conn, name).await
}

async fn upsert_activity(
    conn: &libsql::Connection,
    session_id: &str,
    identifier: &str,
    activity: &ParsedActivity,
    reporting: Option<&str>,
) -> Result<(String, Change), DatabaseError> {
    let fields: Vec<Option<String>> = vec![
        activity.title.as_deref().map(|t| t.trim().to_string()),
        reporting.map(String::from),
        activity.status_code.clone(),
        date_text(activity.planned_start),
        date_text(activity.planned_end),
        activity.default_currency.clone(),
    ];

    let mut rows = conn
        .query(
            "SELECT id, title, reporting_org_id, status_code, planned_start, planned_end, default_currency
             FROM activities WHERE iati_identifier = ?1",
            libsql::params![identifier],
        )
        .await?;
    let existing = match rows.next().await? {
        Some(row) => {
            let mut stored = Vec::with_capacity(fields.len());
            for idx in 1..=6 {
                stored.push(get_opt_string(&row, idx)?);
            }
            Some((row.get::<String>(0)?, stored))
        }
        None => None,
    };
    drop(rows);

    let now = Utc::now().to_rfc3339();
    if let Some((id, stored)) = existing {
        if stored == fields {
            return Ok((id, Change::Unchanged));
        }
        conn.execute(
            "UPDATE activities SET title = ?1, reporting_org_id = ?2, status_code = ?3,
                 planned_start = ?4, planned_end = ?5, default_currency = ?6,
                 import_session_id = ?7, updated_at = ?8
             WHERE id = ?9",
            libsql::params![
                fields[0].as_deref().unwrap_or_default(),
                fields[1].as_deref(),
                fields[2].as_deref(),
                fields[3].as_deref(),
                fields[4].as_deref(),
                fields[5].as_deref(),
                session_id,
                now.as_str(),
                id.as_str()
            ],
        )
        .await?;
        return Ok((id, Change::Updated));
    }

    let id = generate_id(conn, PREFIX_ACTIVITY).await?;
    conn.execute(
        "INSERT INTO activities (id, iati_identifier, title, reporting_org_id, status_code,
             planned_start, planned_end, default_currency, import_session_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        libsql::params![
            id.as_str(),
            identifier,
            fields[0].as_deref().unwrap_or_default(),
            fields[1].as_deref(),
            fields[2].as_deref(),
            fields[3].as_deref(),
            fields[4].as_deref(),
            fields[5].as_deref(),
            session_id,
            now.as_str(),
            now.as_str()
        ],
    )
    .await?;
    Ok((id, Change::Created))
}

async fn fingerprints(
    conn: &libsql::Connection,
    kind: CollectionKind,
    activity_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT fingerprint FROM {} WHERE activity_id = ?1",
                collection_table(kind)
            ),
            libsql::params![activity_id],
        )
        .await?;
    let mut prints = Vec::new();
    while let Some(row) = rows.next().await? {
        prints.push(row.get::<String>(0)?);
    }
    Ok(prints)
}

async fn insert_child(
    conn: &libsql::Connection,
    activity_id: &str,
    child: &PlannedChild<'_>,
) -> Result<(), DatabaseError> {
    let fingerprint = child.fingerprint.as_str();
    match &child.row {
        ChildRow::Participant {
            organization_id,
            role,
        } => {
            let id = generate_id(conn, PREFIX_PARTICIPANT).await?;
            conn.execute(
                "INSERT INTO activity_participants (id, activity_id, organization_id, role, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![id.as_str(), activity_id, organization_id.as_str(), role.as_str(), fingerprint],
            )
            .await?;
        }
        ChildRow::Sector(allocation) => {
            let id = generate_id(conn, PREFIX_SECTOR).await?;
            conn.execute(
                "INSERT INTO activity_sectors (id, activity_id, code, vocabulary, percentage, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    id.as_str(),
                    activity_id,
                    allocation.code.as_deref(),
                    allocation.vocabulary.as_deref(),
                    allocation.percentage,
                    fingerprint
                ],
            )
            .await?;
        }
        ChildRow::Location { kind, allocation } => {
            let id = generate_id(conn, PREFIX_LOCATION).await?;
            conn.execute(
                "INSERT INTO activity_locations (id, activity_id, kind, code, vocabulary, percentage, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    activity_id,
                    kind.as_str(),
                    allocation.code.as_deref(),
                    allocation.vocabulary.as_deref(),
                    allocation.percentage,
                    fingerprint
                ],
            )
            .await?;
        }
        ChildRow::Budget {
            start,
            end,
            money,
            currency,
            usd,
        } => {
            let id = generate_id(conn, PREFIX_BUDGET).await?;
            conn.execute(
                "INSERT INTO budgets (id, activity_id, period_start, period_end, amount, currency,
                     value_date, usd_amount, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                libsql::params![
                    id.as_str(),
                    activity_id,
                    date_text(Some(*start)),
                    date_text(Some(*end)),
                    money.amount.to_string(),
                    currency.as_deref(),
                    date_text(money.value_date),
                    usd.as_ref().ok().map(ToString::to_string),
                    fingerprint
                ],
            )
            .await?;
        }
        ChildRow::Transaction {
            txn,
            transaction_type,
            date,
            money,
            currency,
            usd,
            provider,
            receiver,
        } => {
            let id = generate_id(conn, PREFIX_TRANSACTION).await?;
            conn.execute(
                "INSERT INTO transactions (id, activity_id, ref, transaction_type, transaction_date,
                     amount, currency, value_date, usd_amount, description, provider_org_id,
                     receiver_org_id, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                libsql::params![
                    id.as_str(),
                    activity_id,
                    txn.reference.as_deref(),
                    transaction_type.trim(),
                    date_text(Some(*date)),
                    money.amount.to_string(),
                    currency.as_deref(),
                    date_text(money.value_date),
                    usd.as_ref().ok().map(ToString::to_string),
                    txn.description.as_deref(),
                    provider.as_deref(),
                    receiver.as_deref(),
                    fingerprint
                ],
            )
            .await?;
            let groups = [
                ("sector", &txn.sectors),
                ("country", &txn.recipient_countries),
                ("region", &txn.recipient_regions),
            ];
            for (dimension, group) in groups {
                for allocation in group {
                    conn.execute(
                        "INSERT INTO transaction_allocations (transaction_id, dimension, code, vocabulary, percentage)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        libsql::params![
                            id.as_str(),
                            dimension,
                            allocation.code.as_deref(),
                            allocation.vocabulary.as_deref(),
                            allocation.percentage
                        ],
                    )
                    .await?;
                }
            }
        }
        ChildRow::Indicator {
            result_title,
            indicator,
            title,
            periods,
        } => {
            let id = generate_id(conn, PREFIX_INDICATOR).await?;
            conn.execute(
                "INSERT INTO result_indicators (id, activity_id, result_title, title, measure, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    id.as_str(),
                    activity_id,
                    *result_title,
                    *title,
                    indicator.measure.as_deref(),
                    fingerprint
                ],
            )
            .await?;
            for (start, end, period) in periods {
                conn.execute(
                    "INSERT INTO indicator_periods (indicator_id, period_start, period_end, target, actual)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    libsql::params![
                        id.as_str(),
                        date_text(Some(*start)),
                        date_text(Some(*end)),
                        period.target,
                        period.actual
                    ],
                )
                .await?;
            }
        }
    }
    Ok(())
}

/// Whether this slot's decision would write `value` into the identifier
/// namespace.
fn claims(slot: &ReferenceSlot, value: &str) -> bool {
    match slot.outcome() {
        SlotOutcome::Resolved {
            remember_mapping: true,
            ..
        } => slot
            .reference
            .code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(value)),
        SlotOutcome::Create(organization) => organization
            .canonical_ref
            .iter()
            .chain(organization.alias_refs.iter())
            .any(|id| id.eq_ignore_ascii_case(value)),
        _ => false,
    }
}

async fn audit_slot(
    conn: &libsql::Connection,
    run: &mut CommitRun<'_>,
    slot: &ReferenceSlot,
    entity_id: &str,
    method: ResolutionMethod,
    confidence: Option<f64>,
) -> Result<(), DatabaseError> {
    let acting_user = slot
        .decision
        .as_ref()
        .map_or(run.actor, |d| d.decided_by.as_str());
    insert_audit(
        conn,
        &NewAuditEntry {
            original_code: slot.reference.code.clone(),
            original_display_name: slot.reference.display_name.clone(),
            resolved_entity_id: entity_id.to_string(),
            method,
            confidence,
            import_session_id: Some(run.session.id.clone()),
            acting_user: acting_user.to_string(),
            notes: None,
        },
    )
    .await?;
    run.summary.audit_entries_written += 1;
    Ok(())
}

impl AimsService {
    /// Commit a ready session.
    ///
    /// Returns the summary of a committed import, or a summary with status
    /// `failed` if an infrastructure error rolled everything back. Only the
    /// committed summary's error lists are capped when stored.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::UnresolvedReferences` while decisions are pending.
    /// - `DatabaseError::InvalidTransition` if the session is not ready.
    /// - `DatabaseError::AliasConflict` or `DatabaseError::InvalidDecision`
    ///   if the catalog changed since the decision was made; nothing is
    ///   written and the session returns to `awaiting_resolution`.
    pub async fn commit_import(
        &self,
        session_id: &str,
        actor: &str,
    ) -> Result<ImportSummary, DatabaseError> {
        let _guard = self.write_lock().await;
        let conn = self.db().conn();
        let mut session = load_session(conn, session_id)
            .await?
            .ok_or(DatabaseError::NoResult)?;

        match session.status {
            ImportStatus::ReadyToCommit | ImportStatus::AwaitingResolution => {}
            status => {
                return Err(DatabaseError::InvalidTransition {
                    session_id: session.id.clone(),
                    status,
                    action: "commit".into(),
                });
            }
        }
        let pending = session.pending().len();
        if pending > 0 {
            return Err(DatabaseError::UnresolvedReferences {
                session_id: session.id.clone(),
                pending,
            });
        }
        session.transition(ImportStatus::ReadyToCommit)?;
        session.transition(ImportStatus::Committing)?;
        store_session(conn, &session).await?;
        tracing::info!(session = %session.id, actor, "commit started");

        let mut run = CommitRun::new(&session, actor);
        let tx = conn.transaction().await?;
        let outcome = match self.write_import(&tx, &mut run).await {
            Ok(()) => tx.commit().await.map_err(DatabaseError::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(session = %session_id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        };
        let CommitRun { summary, trail, .. } = run;

        match outcome {
            Ok(()) => self.finish_commit(conn, session, summary, trail).await,
            Err(e) if e.is_decision_error() => {
                self.reopen_session(conn, session, &e).await?;
                Err(e)
            }
            Err(e) => self.fail_commit(conn, session, summary.total_items, &e).await,
        }
    }

    async fn write_import(
        &self,
        conn: &libsql::Connection,
        run: &mut CommitRun<'_>,
    ) -> Result<(), DatabaseError> {
        let session = run.session;
        for slot in &session.references {
            self.settle_slot(conn, run, slot).await?;
        }

        for (a, activity) in session.graph.activities.iter().enumerate() {
            let path = activity_path(a);
            if let Some(exclusion) = &activity.exclusion {
                run.summary.skip(path, &exclusion.reason);
                continue;
            }
            let reporting = match run.party(activity.reporting_org.as_ref())? {
                Party::Absent => None,
                Party::Entity(id) => Some(id),
                Party::Skipped(reason) => {
                    run.summary.skip(path, format!("reporting {reason}"));
                    continue;
                }
            };

            savepoint(conn, "activity_write").await?;
            match self
                .write_activity(conn, run, &path, activity, reporting.as_deref())
                .await
            {
                Ok(()) => release(conn, "activity_write").await?,
                Err(e) if e.is_constraint_violation() => {
                    roll_back_to(conn, "activity_write").await?;
                    tracing::warn!(session = %session.id, item = %path, error = %e, "activity failed");
                    run.summary.fail(path, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Turn one slot into an entity id (claiming a remembered alias or
    /// creating the organization as needed) or a skip.
    async fn settle_slot(
        &self,
        conn: &libsql::Connection,
        run: &mut CommitRun<'_>,
        slot: &ReferenceSlot,
    ) -> Result<(), DatabaseError> {
        let target = match slot.outcome() {
            SlotOutcome::Resolved {
                entity_id,
                method,
                confidence,
                remember_mapping,
            } => {
                if fetch_organization(conn, entity_id).await?.is_none() {
                    return Err(DatabaseError::InvalidDecision {
                        key: slot.key.clone(),
                        reason: format!("organization {entity_id} no longer exists"),
                    });
                }
                if remember_mapping {
                    if let Some(code) = slot.reference.code.as_deref() {
                        let position = next_alias_position(conn, entity_id).await?;
                        if claim_identifier(conn, code, entity_id, IdentifierKind::Alias, position)
                            .await?
                        {
                            run.record(
                                TrailOp::Alias,
                                EntityType::Organization,
                                entity_id,
                                json!({"alias_ref": code}),
                            );
                        } else {
                            tracing::debug!(
                                code,
                                entity_id,
                                "identifier already held by the linked organization"
                            );
                        }
                    }
                }
                audit_slot(conn, run, slot, entity_id, method, confidence).await?;
                Target::Entity(entity_id.to_string())
            }
            SlotOutcome::Create(requested) => {
                let organization =
                    requested
                        .normalized()
                        .map_err(|e| DatabaseError::InvalidDecision {
                            key: slot.key.clone(),
                            reason: e.to_string(),
                        })?;
                let created = insert_organization(conn, &organization).await?;
                run.summary.created += 1;
                let data = serde_json::to_value(&created).map_err(|e| DatabaseError::Other(e.into()))?;
                run.record(TrailOp::Create, EntityType::Organization, &created.id, data);
                audit_slot(conn, run, slot, &created.id, ResolutionMethod::OperatorCreate, None)
                    .await?;
                Target::Entity(created.id)
            }
            SlotOutcome::Skip(reason) => {
                Target::Skipped(reason.unwrap_or("skipped by operator").to_string())
            }
            SlotOutcome::Pending => {
                return Err(DatabaseError::InvalidState(format!(
                    "reference {} reached commit without a decision",
                    slot.key
                )));
            }
        };
        run.targets.insert(slot.key.clone(), target);
        Ok(())
    }

    async fn write_activity<'s>(
        &self,
        conn: &libsql::Connection,
        run: &mut CommitRun<'s>,
        path: &str,
        activity: &'s ParsedActivity,
        reporting: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let Some(identifier) = activity.identifier.as_deref() else {
            run.summary.skip(path, "missing iati-identifier");
            return Ok(());
        };
        let (activity_id, change) =
            upsert_activity(conn, &run.session.id, identifier, activity, reporting).await?;
        match change {
            Change::Created => {
                run.summary.created += 1;
                run.record(
                    TrailOp::Create,
                    EntityType::Activity,
                    &activity_id,
                    activity_payload(identifier, activity, reporting),
                );
            }
            Change::Updated => {
                run.summary.updated += 1;
                run.record(
                    TrailOp::Update,
                    EntityType::Activity,
                    &activity_id,
                    activity_payload(identifier, activity, reporting),
                );
            }
            Change::Unchanged => run.summary.unchanged += 1,
        }

        let participants = run.plan_participants(path, activity)?;
        self.apply_collection(conn, run, CollectionKind::Participants, &activity_id, participants)
            .await?;
        self.apply_collection(conn, run, CollectionKind::Sectors, &activity_id, plan_sectors(path, activity))
            .await?;
        self.apply_collection(conn, run, CollectionKind::Locations, &activity_id, plan_locations(path, activity))
            .await?;
        let budgets = run.plan_budgets(path, activity, self.rates());
        self.apply_collection(conn, run, CollectionKind::Budgets, &activity_id, budgets)
            .await?;
        let transactions = run.plan_transactions(path, activity, self.rates())?;
        self.apply_collection(conn, run, CollectionKind::Transactions, &activity_id, transactions)
            .await?;
        let results = run.plan_results(path, activity);
        self.apply_collection(conn, run, CollectionKind::Results, &activity_id, results)
            .await
    }

    /// Write one child collection under the configured strategy.
    ///
    /// Replace leaves an identical collection untouched; otherwise it deletes
    /// the stored rows and inserts the incoming set, counting rows whose
    /// fingerprint was already present as unchanged.
    async fn apply_collection(
        &self,
        conn: &libsql::Connection,
        run: &mut CommitRun<'_>,
        kind: CollectionKind,
        activity_id: &str,
        children: Vec<PlannedChild<'_>>,
    ) -> Result<(), DatabaseError> {
        let mut previous: HashMap<String, u32> = HashMap::new();
        if self.strategies().for_kind(kind) == CollectionStrategy::Replace {
            let mut stored = fingerprints(conn, kind, activity_id).await?;
            let mut incoming: Vec<&str> = children.iter().map(|c| c.fingerprint.as_str()).collect();
            stored.sort_unstable();
            incoming.sort_unstable();
            if stored == incoming {
                run.summary.unchanged += u32::try_from(children.len()).unwrap_or(u32::MAX);
                return Ok(());
            }
            conn.execute(
                &format!("DELETE FROM {} WHERE activity_id = ?1", collection_table(kind)),
                libsql::params![activity_id],
            )
            .await?;
            for print in stored {
                *previous.entry(print).or_default() += 1;
            }
        }

        for child in children {
            savepoint(conn, "item_write").await?;
            match insert_child(conn, activity_id, &child).await {
                Ok(()) => {
                    release(conn, "item_write").await?;
                    match previous.get_mut(&child.fingerprint) {
                        Some(count) if *count > 0 => {
                            *count -= 1;
                            run.summary.unchanged += 1;
                        }
                        _ => run.summary.created += 1,
                    }
                    if let Some(why) = child.row.usd_omission() {
                        tracing::warn!(item = %child.path, reason = why, "stored without a USD value");
                        run.summary.usd_omitted += 1;
                    }
                }
                Err(e) if e.is_constraint_violation() => {
                    roll_back_to(conn, "item_write").await?;
                    tracing::warn!(session = %run.session.id, item = %child.path, error = %e, "item failed");
                    run.summary.fail(child.path, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        run.summary.deleted += previous.values().sum::<u32>();
        Ok(())
    }

    async fn finish_commit(
        &self,
        conn: &libsql::Connection,
        mut session: ImportSession,
        mut summary: ImportSummary,
        trail: Vec<TrailOperation>,
    ) -> Result<ImportSummary, DatabaseError> {
        summary.status = CommitStatus::Committed;
        session.summary = Some(summary.capped(self.error_log_limit()));
        session.failure = None;
        session.transition(ImportStatus::Committed)?;
        store_session(conn, &session).await?;

        for op in &trail {
            if let Err(e) = self.trail().append_validated(op) {
                tracing::warn!(session = %session.id, error = %e, "trail write failed");
            }
        }
        tracing::info!(
            session = %session.id,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "import committed"
        );
        Ok(summary)
    }

    /// Send the session back to the operator with the offending decisions
    /// cleared.
    async fn reopen_session(
        &self,
        conn: &libsql::Connection,
        mut session: ImportSession,
        error: &DatabaseError,
    ) -> Result<(), DatabaseError> {
        session.transition(ImportStatus::AwaitingResolution)?;
        match error {
            DatabaseError::AliasConflict { value, .. } => {
                for slot in &mut session.references {
                    if claims(slot, value) {
                        slot.decision = None;
                    }
                }
            }
            DatabaseError::InvalidDecision { key, .. } => {
                if let Some(slot) = session.slot_mut(key) {
                    if slot.decision.take().is_none() {
                        slot.resolution = ResolutionResult::unresolved(UnresolvedReason::NoCandidate);
                    }
                }
            }
            _ => {}
        }
        session.transition(session.decided_status())?;
        store_session(conn, &session).await?;
        tracing::warn!(session = %session.id, error = %error, status = %session.status, "commit aborted, session reopened");
        Ok(())
    }

    async fn fail_commit(
        &self,
        conn: &libsql::Connection,
        mut session: ImportSession,
        total_items: u32,
        error: &DatabaseError,
    ) -> Result<ImportSummary, DatabaseError> {
        tracing::error!(session = %session.id, error = %error, "commit rolled back");
        let mut summary = ImportSummary::new(session.id.as_str());
        summary.status = CommitStatus::Failed;
        summary.total_items = total_items;
        summary.failure = Some(error.to_string());

        session.failure = Some(error.to_string());
        session.summary = Some(summary.clone());
        session.transition(ImportStatus::Failed)?;
        if let Err(e) = store_session(conn, &session).await {
            tracing::error!(session = %session.id, error = %e, "could not record the rollback");
        }
        Ok(summary)
    }
}

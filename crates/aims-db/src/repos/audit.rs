//! Resolution audit repository.
//!
//! Append-only: rows are inserted and read, never updated or deleted. The
//! schema's triggers reject any other write, except the foreign-key action
//! that nulls `resolved_entity_id` when an organization is deleted.

use aims_core::entities::{NewAuditEntry, ResolutionAuditEntry};
use aims_core::ids::PREFIX_AUDIT;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum};
use crate::service::AimsService;

const AUDIT_COLUMNS: &str = "id, original_code, original_display_name, resolved_entity_id, \
     resolved_entity_name, method, confidence, import_session_id, acting_user, notes, created_at";

/// Filter criteria for audit queries.
#[derive(Debug, Default)]
pub struct AuditFilter {
    pub entity_id: Option<String>,
    pub import_session_id: Option<String>,
    pub acting_user: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Page size. `None` returns every matching entry.
    pub limit: Option<u32>,
    /// Entries to skip before the page starts.
    pub offset: Option<u32>,
}

fn row_to_entry(row: &libsql::Row) -> Result<ResolutionAuditEntry, DatabaseError> {
    Ok(ResolutionAuditEntry {
        id: row.get::<String>(0)?,
        original_code: get_opt_string(row, 1)?,
        original_display_name: get_opt_string(row, 2)?,
        resolved_entity_id: get_opt_string(row, 3)?,
        resolved_entity_name: get_opt_string(row, 4)?,
        method: parse_enum(&row.get::<String>(5)?)?,
        confidence: row.get::<Option<f64>>(6)?,
        import_session_id: get_opt_string(row, 7)?,
        acting_user: row.get::<String>(8)?,
        notes: get_opt_string(row, 9)?,
        created_at: parse_datetime(&row.get::<String>(10)?)?,
    })
}

/// Insert one entry, snapshotting the organization's current name.
pub(crate) async fn insert_audit(
    conn: &libsql::Connection,
    entry: &NewAuditEntry,
) -> Result<ResolutionAuditEntry, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT name FROM organizations WHERE id = ?1",
            libsql::params![entry.resolved_entity_id.as_str()],
        )
        .await?;
    let name = match rows.next().await? {
        Some(row) => row.get::<String>(0)?,
        None => {
            return Err(DatabaseError::InvalidState(format!(
                "cannot audit a resolution to unknown organization {}",
                entry.resolved_entity_id
            )));
        }
    };

    let recorded = ResolutionAuditEntry {
        id: crate::generate_id(conn, PREFIX_AUDIT).await?,
        original_code: entry.original_code.clone(),
        original_display_name: entry.original_display_name.clone(),
        resolved_entity_id: Some(entry.resolved_entity_id.clone()),
        resolved_entity_name: Some(name),
        method: entry.method,
        confidence: entry.confidence,
        import_session_id: entry.import_session_id.clone(),
        acting_user: entry.acting_user.clone(),
        notes: entry.notes.clone(),
        created_at: Utc::now(),
    };

    conn.execute(
        &format!("INSERT INTO resolution_audit ({AUDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        libsql::params![
            recorded.id.as_str(),
            recorded.original_code.as_deref(),
            recorded.original_display_name.as_deref(),
            recorded.resolved_entity_id.as_deref(),
            recorded.resolved_entity_name.as_deref(),
            recorded.method.as_str(),
            recorded.confidence,
            recorded.import_session_id.as_deref(),
            recorded.acting_user.as_str(),
            recorded.notes.as_deref(),
            recorded.created_at.to_rfc3339()
        ],
    )
    .await?;
    Ok(recorded)
}

impl AimsService {
    /// Record a resolution outside an import commit (e.g. a manual mapping).
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidState` if the organization does not
    /// exist, or `DatabaseError` if the INSERT fails.
    pub async fn record_resolution(
        &self,
        entry: &NewAuditEntry,
    ) -> Result<ResolutionAuditEntry, DatabaseError> {
        let _guard = self.write_lock().await;
        insert_audit(self.db().conn(), entry).await
    }

    /// Query audit entries with optional filters, oldest first. Without a
    /// limit the whole matching history is returned.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query_audit(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<ResolutionAuditEntry>, DatabaseError> {
        let _guard = self.read_lock().await;
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref eid) = filter.entity_id {
            params.push(libsql::Value::Text(eid.clone()));
            conditions.push(format!("resolved_entity_id = ?{}", params.len()));
        }
        if let Some(ref sid) = filter.import_session_id {
            params.push(libsql::Value::Text(sid.clone()));
            conditions.push(format!("import_session_id = ?{}", params.len()));
        }
        if let Some(ref user) = filter.acting_user {
            params.push(libsql::Value::Text(user.clone()));
            conditions.push(format!("acting_user = ?{}", params.len()));
        }
        if let Some(since) = filter.since {
            params.push(libsql::Value::Text(since.to_rfc3339()));
            conditions.push(format!("created_at >= ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        let page = match (filter.limit, filter.offset) {
            (None, None) => String::new(),
            (limit, offset) => format!(
                "LIMIT {} OFFSET {}",
                limit.map_or(-1, i64::from),
                offset.unwrap_or(0)
            ),
        };
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM resolution_audit {where_clause}
             ORDER BY created_at, rowid {page}"
        );

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }
}

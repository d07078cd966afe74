//! Import session repository.
//!
//! A session is stored as one JSON document (`state`) with its status and
//! committed summary mirrored into columns for listing.

use aims_core::entities::ImportSession;
use aims_core::enums::ImportStatus;
use aims_core::responses::ImportSummary;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_json, to_json};
use crate::service::AimsService;

/// Insert or overwrite a session.
pub(crate) async fn store_session(
    conn: &libsql::Connection,
    session: &ImportSession,
) -> Result<(), DatabaseError> {
    let summary = session.summary.as_ref().map(to_json).transpose()?;
    conn.execute(
        "INSERT INTO import_sessions (id, status, actor, source_name, state, summary, started_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             state = excluded.state,
             summary = excluded.summary,
             updated_at = excluded.updated_at",
        libsql::params![
            session.id.as_str(),
            session.status.as_str(),
            session.actor.as_str(),
            session.source_name.as_str(),
            to_json(session)?,
            summary,
            session.started_at.to_rfc3339(),
            session.updated_at.to_rfc3339()
        ],
    )
    .await?;
    Ok(())
}

pub(crate) async fn load_session(
    conn: &libsql::Connection,
    id: &str,
) -> Result<Option<ImportSession>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT state FROM import_sessions WHERE id = ?1",
            libsql::params![id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_json(&row.get::<String>(0)?)?)),
        None => Ok(None),
    }
}

/// One line of the import log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLogEntry {
    pub id: String,
    pub status: ImportStatus,
    pub actor: String,
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AimsService {
    /// Load a session by id. This is how an operator resumes work.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if no session has this id.
    pub async fn get_import_session(&self, id: &str) -> Result<ImportSession, DatabaseError> {
        let _guard = self.read_lock().await;
        load_session(self.db().conn(), id)
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// The stored summary of a committed (or rolled back) session.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if no session has this id.
    pub async fn import_summary(&self, id: &str) -> Result<Option<ImportSummary>, DatabaseError> {
        let _guard = self.read_lock().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT summary FROM import_sessions WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_opt_string(&row, 0)?
            .map(|s| parse_json(&s))
            .transpose()
    }

    /// Sessions newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_import_sessions(
        &self,
        status: Option<ImportStatus>,
        limit: u32,
    ) -> Result<Vec<ImportLogEntry>, DatabaseError> {
        let (where_clause, params) = match status {
            Some(status) => (
                "WHERE status = ?1",
                vec![libsql::Value::Text(status.as_str().to_string())],
            ),
            None => ("", Vec::new()),
        };
        let _guard = self.read_lock().await;
        let sql = format!(
            "SELECT id, status, actor, source_name, started_at, updated_at
             FROM import_sessions {where_clause}
             ORDER BY started_at DESC, rowid DESC LIMIT {limit}"
        );
        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(ImportLogEntry {
                id: row.get::<String>(0)?,
                status: parse_enum(&row.get::<String>(1)?)?,
                actor: row.get::<String>(2)?,
                source_name: row.get::<String>(3)?,
                started_at: parse_datetime(&row.get::<String>(4)?)?,
                updated_at: parse_datetime(&row.get::<String>(5)?)?,
            });
        }
        Ok(entries)
    }
}

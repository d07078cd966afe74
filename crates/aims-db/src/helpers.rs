//! Row-to-entity parsing helpers.
//!
//! Every repo converts column-indexed `libsql::Row` values into typed
//! entities. These helpers isolate that parsing and accept both datetime
//! formats that end up in the database (`SQLite`'s `datetime('now')` and
//! Rust's `to_rfc3339()`).

use aims_core::enums::CollectionKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string is neither RFC 3339 nor
/// `%Y-%m-%d %H:%M:%S`.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with every aims-core enum that uses `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any variant.
pub fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Deserialize a JSON TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the column holds invalid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(s)
        .map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))
}

/// Serialize a value for a JSON TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Other` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Other(e.into()))
}

/// ISO date for a DATE-like TEXT column.
#[must_use]
pub fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Map `CollectionKind` to the table holding that activity child collection.
///
/// Exhaustive match, so a new collection forces a table.
#[must_use]
pub const fn collection_table(kind: CollectionKind) -> &'static str {
    match kind {
        CollectionKind::Participants => "activity_participants",
        CollectionKind::Sectors => "activity_sectors",
        CollectionKind::Locations => "activity_locations",
        CollectionKind::Budgets => "budgets",
        CollectionKind::Transactions => "transactions",
        CollectionKind::Results => "result_indicators",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::enums::ImportStatus;

    #[test]
    fn parses_both_datetime_formats() {
        let a = parse_datetime("2026-02-09T14:30:00+00:00").unwrap();
        let b = parse_datetime("2026-02-09 14:30:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn parses_snake_case_enums() {
        let status: ImportStatus = parse_enum("ready_to_commit").unwrap();
        assert_eq!(status, ImportStatus::ReadyToCommit);
        assert!(parse_enum::<ImportStatus>("ReadyToCommit").is_err());
    }

    #[test]
    fn every_collection_has_a_table() {
        let tables: std::collections::HashSet<_> =
            CollectionKind::ALL.iter().map(|k| collection_table(*k)).collect();
        assert_eq!(tables.len(), CollectionKind::ALL.len());
    }
}

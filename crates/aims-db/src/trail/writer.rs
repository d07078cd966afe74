//! JSONL trail writer.
//!
//! Appends `TrailOperation` records to per-session `{trail_dir}/{session_id}.jsonl`
//! files. Uses `serde_jsonlines::append_json_lines` for per-line appends.

use std::path::{Path, PathBuf};

use aims_core::entities::Organization;
use aims_core::enums::{EntityType, TrailOp};
use aims_core::trail::TrailOperation;

use crate::error::DatabaseError;

/// Appends trail operations to per-session JSONL files.
///
/// The committer writes one operation per organization or activity mutation
/// after its transaction commits. The database stays authoritative.
pub struct TrailWriter {
    trail_dir: PathBuf,
    enabled: bool,
    organization_schema: serde_json::Value,
}

impl TrailWriter {
    /// Create a new `TrailWriter` pointing at the given directory.
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created.
    pub fn new(trail_dir: PathBuf) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(&trail_dir).map_err(|e| DatabaseError::Other(e.into()))?;
        Ok(Self {
            trail_dir,
            enabled: true,
            organization_schema: organization_schema(),
        })
    }

    /// Create a disabled writer (for testing or when no trail is configured).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            trail_dir: PathBuf::new(),
            enabled: false,
            organization_schema: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a trail operation to the session's JSONL file.
    ///
    /// File path: `{trail_dir}/{op.ses}.jsonl`
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the file write fails.
    pub fn append(&self, op: &TrailOperation) -> Result<(), DatabaseError> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.trail_dir.join(format!("{}.jsonl", op.ses));
        serde_jsonlines::append_json_lines(&path, [op])
            .map_err(|e| DatabaseError::Other(e.into()))?;
        Ok(())
    }

    /// Append with schema validation of the `data` field.
    ///
    /// Only organization `Create` ops carry a full entity and are checked.
    /// Validation is warn-only; the line is written either way.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the file write fails.
    pub fn append_validated(&self, op: &TrailOperation) -> Result<(), DatabaseError> {
        if !self.enabled {
            return Ok(());
        }

        if op.op == TrailOp::Create && op.entity == EntityType::Organization {
            let problems = schema_problems(&self.organization_schema, &op.data);
            if !problems.is_empty() {
                tracing::warn!(
                    entity = %op.entity,
                    id = %op.id,
                    problems = ?problems,
                    "trail payload does not match entity schema"
                );
            }
        }

        self.append(op)
    }

    /// The directory where trail files are stored.
    #[must_use]
    pub fn trail_dir(&self) -> &Path {
        &self.trail_dir
    }
}

fn organization_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Organization)).unwrap_or_default()
}

fn schema_problems(schema: &serde_json::Value, instance: &serde_json::Value) -> Vec<String> {
    if schema.is_null() {
        return Vec::new();
    }
    match jsonschema::validator_for(schema) {
        Ok(validator) => validator.iter_errors(instance).map(|e| e.to_string()).collect(),
        Err(e) => vec![format!("schema did not compile: {e}")],
    }
}

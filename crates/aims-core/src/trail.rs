//! JSONL commit trail envelope.
//!
//! Each committed import appends one `TrailOperation` per organization or
//! activity mutation to `{trail_dir}/{session_id}.jsonl`. Old lines without a
//! `v` field read as version 1.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EntityType, TrailOp};

const fn default_trail_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TrailOperation {
    #[serde(default = "default_trail_version")]
    pub v: u32,

    /// RFC 3339 timestamp.
    pub ts: String,

    /// Import session that produced the mutation.
    pub ses: String,

    pub op: TrailOp,

    pub entity: EntityType,

    pub id: String,

    /// Full state for `Create`, changed fields for `Update`, the new alias for
    /// `Alias`.
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_defaults_to_one() {
        let json = r#"{"ts":"2026-01-01T00:00:00Z","ses":"imp-00000000","op":"alias","entity":"organization","id":"org-11111111","data":{"alias_ref":"010712"}}"#;
        let op: TrailOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.v, 1);
        assert_eq!(op.op, TrailOp::Alias);
        assert_eq!(op.data["alias_ref"], "010712");
    }
}

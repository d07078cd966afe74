use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ResolutionMethod;

/// An append-only record of why a reference became an organization.
///
/// `resolved_entity_id` is nulled if the organization is later deleted;
/// `resolved_entity_name` keeps the name as it was at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResolutionAuditEntry {
    pub id: String,
    pub original_code: Option<String>,
    pub original_display_name: Option<String>,
    pub resolved_entity_id: Option<String>,
    pub resolved_entity_name: Option<String>,
    pub method: ResolutionMethod,
    pub confidence: Option<f64>,
    pub import_session_id: Option<String>,
    pub acting_user: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a resolution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NewAuditEntry {
    pub original_code: Option<String>,
    pub original_display_name: Option<String>,
    pub resolved_entity_id: String,
    pub method: ResolutionMethod,
    pub confidence: Option<f64>,
    pub import_session_id: Option<String>,
    pub acting_user: String,
    pub notes: Option<String>,
}

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::OrgType;
use crate::errors::CoreError;

/// A canonical organization record.
///
/// `canonical_ref` and every entry of `alias_refs` share one uniqueness
/// namespace across all organizations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub canonical_ref: Option<String>,
    pub name: String,
    pub org_type: OrgType,
    pub alias_refs: Vec<String>,
    pub name_aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an operator (or the importer) supplies to create an organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NewOrganization {
    pub name: String,
    pub canonical_ref: Option<String>,
    pub org_type: Option<OrgType>,
    #[serde(default)]
    pub alias_refs: Vec<String>,
    #[serde(default)]
    pub name_aliases: Vec<String>,
}

impl NewOrganization {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Trim every field and normalize the alias collections.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the name is blank.
    pub fn normalized(&self) -> Result<Self, CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "organization name must not be empty".into(),
            ));
        }
        let canonical_ref = self
            .canonical_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from);
        Ok(Self {
            name: name.to_string(),
            alias_refs: normalize_alias_refs(&self.alias_refs, canonical_ref.as_deref()),
            name_aliases: normalize_name_aliases(&self.name_aliases, name),
            canonical_ref,
            org_type: self.org_type,
        })
    }
}

/// Trim, drop blanks, drop the owner's own canonical ref, and deduplicate
/// alias refs preserving first occurrence. Comparison is case-insensitive,
/// the same way the identifier namespace compares values.
#[must_use]
pub fn normalize_alias_refs(values: &[String], canonical_ref: Option<&str>) -> Vec<String> {
    let own = canonical_ref.map(str::to_lowercase);
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter(|v| {
            let folded = v.to_lowercase();
            own.as_deref() != Some(folded.as_str()) && seen.insert(folded)
        })
        .map(String::from)
        .collect()
}

/// Trim, drop blanks and copies of the display name, and deduplicate name
/// aliases case-insensitively preserving first occurrence.
#[must_use]
pub fn normalize_name_aliases(values: &[String], name: &str) -> Vec<String> {
    let own = name.trim().to_lowercase();
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter(|v| {
            let folded = v.to_lowercase();
            folded != own && seen.insert(folded)
        })
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn alias_refs_trim_dedupe_and_drop_own_canonical() {
        let got = normalize_alias_refs(
            &strings(&[" 010712", "010712", "", "kr-gov-010", "KR-AID-7", "kr-aid-7"]),
            Some("KR-GOV-010"),
        );
        assert_eq!(got, strings(&["010712", "KR-AID-7"]));
    }

    #[test]
    fn name_aliases_dedupe_case_insensitively() {
        let got = normalize_name_aliases(
            &strings(&["KOICA", "koica ", "Korea Intl Coop", "korea international cooperation agency"]),
            "Korea International Cooperation Agency",
        );
        assert_eq!(got, strings(&["KOICA", "Korea Intl Coop"]));
    }

    #[test]
    fn new_organization_requires_name() {
        let err = NewOrganization::named("   ").normalized().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn new_organization_normalizes_fields() {
        let org = NewOrganization {
            name: "  World Bank ".into(),
            canonical_ref: Some(" 44000 ".into()),
            org_type: None,
            alias_refs: strings(&["44000", "IBRD"]),
            name_aliases: strings(&["world bank", "IBRD"]),
        }
        .normalized()
        .unwrap();
        assert_eq!(org.name, "World Bank");
        assert_eq!(org.canonical_ref.as_deref(), Some("44000"));
        assert_eq!(org.alias_refs, strings(&["IBRD"]));
        assert_eq!(org.name_aliases, strings(&["IBRD"]));
    }
}

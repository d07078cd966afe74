//! Organization references extracted from incoming documents.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An unresolved pointer to an organization: the code and display text exactly
/// as a document carried them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Reference {
    pub code: Option<String>,
    pub display_name: Option<String>,
}

impl Reference {
    #[must_use]
    pub fn new(code: Option<&str>, display_name: Option<&str>) -> Self {
        Self {
            code: code.map(String::from),
            display_name: display_name.map(String::from),
        }
    }

    /// Trim both fields and collapse blank values to `None`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            code: trimmed(self.code.as_deref()),
            display_name: trimmed(self.display_name.as_deref()),
        }
    }

    /// Neither a code nor a name survives normalization.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        let n = self.normalized();
        n.code.is_none() && n.display_name.is_none()
    }

    /// Session-scoped identity of this reference after normalization.
    #[must_use]
    pub fn key(&self) -> ReferenceKey {
        let n = self.normalized();
        ReferenceKey(format!(
            "{}\u{1f}{}",
            n.code.as_deref().unwrap_or_default(),
            n.display_name.as_deref().unwrap_or_default()
        ))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.as_deref(), self.display_name.as_deref()) {
            (Some(code), Some(name)) => write!(f, "{code} ({name})"),
            (Some(code), None) => f.write_str(code),
            (None, Some(name)) => f.write_str(name),
            (None, None) => f.write_str("<blank reference>"),
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Deduplication key for references inside one import session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ReferenceKey(pub String);

impl ReferenceKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace('\u{1f}', " | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_blanks() {
        let r = Reference::new(Some("  010712 "), Some("   "));
        let n = r.normalized();
        assert_eq!(n.code.as_deref(), Some("010712"));
        assert_eq!(n.display_name, None);
    }

    #[test]
    fn key_ignores_surrounding_whitespace() {
        let a = Reference::new(Some("GB-GOV-1"), Some("DFID"));
        let b = Reference::new(Some(" GB-GOV-1"), Some("DFID "));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_distinguishes_code_from_name() {
        let a = Reference::new(Some("X"), None);
        let b = Reference::new(None, Some("X"));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn blank_reference() {
        assert!(Reference::new(Some(" "), None).is_blank());
        assert!(!Reference::new(None, Some("World Bank")).is_blank());
    }
}

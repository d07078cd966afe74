//! Organization update builder.
//!
//! Canonical refs never change after creation; only the alias lists and the
//! display name can be edited.

use aims_core::enums::OrgType;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_type: Option<OrgType>,
    /// Replaces the full alias-ref list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_refs: Option<Vec<String>>,
    /// Replaces the full name-alias list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_aliases: Option<Vec<String>>,
}

impl OrganizationUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.org_type.is_none()
            && self.alias_refs.is_none()
            && self.name_aliases.is_none()
    }
}

pub struct OrganizationUpdateBuilder(OrganizationUpdate);

impl OrganizationUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(OrganizationUpdate::default())
    }

    #[must_use]
    pub fn name(mut self, val: impl Into<String>) -> Self {
        self.0.name = Some(val.into());
        self
    }

    #[must_use]
    pub const fn org_type(mut self, val: OrgType) -> Self {
        self.0.org_type = Some(val);
        self
    }

    #[must_use]
    pub fn alias_refs<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.alias_refs = Some(values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn name_aliases<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.name_aliases = Some(values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn build(self) -> OrganizationUpdate {
        self.0
    }
}

impl Default for OrganizationUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Organization repository: canonical entities and the identifier namespace.
//!
//! Canonical refs and alias refs live together in `organization_identifiers`,
//! whose primary key is the identifier value. `claim_identifier` is the only
//! writer of that table.

use std::collections::HashMap;

use aims_core::entities::{
    NewOrganization, Organization, normalize_alias_refs, normalize_name_aliases,
};
use aims_core::errors::CoreError;
use aims_core::ids::PREFIX_ORGANIZATION;
use aims_core::reference::Reference;
use aims_core::resolution::{ResolutionResult, Resolver};
use aims_core::responses::CandidateMatch;
use chrono::Utc;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_json, to_json};
use crate::service::AimsService;
use crate::updates::organization::OrganizationUpdate;

const ORG_COLUMNS: &str = "id, canonical_ref, name, org_type, name_aliases, created_at, updated_at";

/// Which side of the namespace an identifier sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Canonical,
    Alias,
}

impl IdentifierKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Alias => "alias",
        }
    }
}

fn row_to_organization(row: &libsql::Row) -> Result<Organization, DatabaseError> {
    Ok(Organization {
        id: row.get::<String>(0)?,
        canonical_ref: get_opt_string(row, 1)?,
        name: row.get::<String>(2)?,
        org_type: parse_enum(&row.get::<String>(3)?)?,
        alias_refs: Vec::new(),
        name_aliases: parse_json(&row.get::<String>(4)?)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
        updated_at: parse_datetime(&row.get::<String>(6)?)?,
    })
}

/// The organization holding `value`, compared case-insensitively.
pub(crate) async fn owner_of(
    conn: &libsql::Connection,
    value: &str,
) -> Result<Option<String>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT organization_id FROM organization_identifiers WHERE value = ?1",
            libsql::params![value],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<String>(0)?)),
        None => Ok(None),
    }
}

/// Give `value` to `organization_id`.
///
/// Returns `true` if the identifier was newly written and `false` if the
/// organization already held it.
///
/// # Errors
///
/// Returns `DatabaseError::AliasConflict` if another organization holds it.
pub(crate) async fn claim_identifier(
    conn: &libsql::Connection,
    value: &str,
    organization_id: &str,
    kind: IdentifierKind,
    position: usize,
) -> Result<bool, DatabaseError> {
    match owner_of(conn, value).await? {
        Some(owner) if owner == organization_id => return Ok(false),
        Some(owner) => {
            return Err(DatabaseError::AliasConflict {
                value: value.to_string(),
                conflicting_entity_id: owner,
            });
        }
        None => {}
    }

    let position = i64::try_from(position).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO organization_identifiers (value, organization_id, kind, position)
         VALUES (?1, ?2, ?3, ?4)",
        libsql::params![value, organization_id, kind.as_str(), position],
    )
    .await?;
    Ok(true)
}

/// Next free alias position for an organization.
pub(crate) async fn next_alias_position(
    conn: &libsql::Connection,
    organization_id: &str,
) -> Result<usize, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM organization_identifiers
             WHERE organization_id = ?1 AND kind = 'alias'",
            libsql::params![organization_id],
        )
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    Ok(usize::try_from(row.get::<i64>(0)?).unwrap_or_default())
}

/// First identifier of `values` held by someone other than `organization_id`.
pub(crate) async fn find_conflict<'v>(
    conn: &libsql::Connection,
    values: impl IntoIterator<Item = &'v str>,
    organization_id: Option<&str>,
) -> Result<Option<DatabaseError>, DatabaseError> {
    for value in values {
        if let Some(owner) = owner_of(conn, value).await? {
            if Some(owner.as_str()) != organization_id {
                return Ok(Some(DatabaseError::AliasConflict {
                    value: value.to_string(),
                    conflicting_entity_id: owner,
                }));
            }
        }
    }
    Ok(None)
}

/// Insert an already-normalized organization and claim its identifiers.
pub(crate) async fn insert_organization(
    conn: &libsql::Connection,
    new: &NewOrganization,
) -> Result<Organization, DatabaseError> {
    let identifiers = new
        .canonical_ref
        .iter()
        .chain(new.alias_refs.iter())
        .map(String::as_str);
    if let Some(conflict) = find_conflict(conn, identifiers, None).await? {
        return Err(conflict);
    }

    let now = Utc::now();
    let id = crate::generate_id(conn, PREFIX_ORGANIZATION).await?;
    let org = Organization {
        id,
        canonical_ref: new.canonical_ref.clone(),
        name: new.name.clone(),
        org_type: new.org_type.unwrap_or_default(),
        alias_refs: new.alias_refs.clone(),
        name_aliases: new.name_aliases.clone(),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO organizations (id, canonical_ref, name, org_type, name_aliases, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        libsql::params![
            org.id.as_str(),
            org.canonical_ref.as_deref(),
            org.name.as_str(),
            org.org_type.as_str(),
            to_json(&org.name_aliases)?,
            now.to_rfc3339(),
            now.to_rfc3339()
        ],
    )
    .await?;

    if let Some(canonical) = org.canonical_ref.as_deref() {
        claim_identifier(conn, canonical, &org.id, IdentifierKind::Canonical, 0).await?;
    }
    for (position, alias) in org.alias_refs.iter().enumerate() {
        claim_identifier(conn, alias, &org.id, IdentifierKind::Alias, position).await?;
    }
    Ok(org)
}

pub(crate) async fn fetch_organization(
    conn: &libsql::Connection,
    id: &str,
) -> Result<Option<Organization>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
            libsql::params![id],
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    let mut org = row_to_organization(&row)?;

    let mut rows = conn
        .query(
            "SELECT value FROM organization_identifiers
             WHERE organization_id = ?1 AND kind = 'alias' ORDER BY position",
            libsql::params![id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        org.alias_refs.push(row.get::<String>(0)?);
    }
    Ok(Some(org))
}

/// Every organization with its alias refs, ordered by id.
pub(crate) async fn fetch_catalog(
    conn: &libsql::Connection,
) -> Result<Vec<Organization>, DatabaseError> {
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    let mut rows = conn
        .query(
            "SELECT organization_id, value FROM organization_identifiers
             WHERE kind = 'alias' ORDER BY organization_id, position",
            (),
        )
        .await?;
    while let Some(row) = rows.next().await? {
        aliases
            .entry(row.get::<String>(0)?)
            .or_default()
            .push(row.get::<String>(1)?);
    }

    let mut rows = conn
        .query(
            &format!("SELECT {ORG_COLUMNS} FROM organizations ORDER BY id"),
            (),
        )
        .await?;
    let mut catalog = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut org = row_to_organization(&row)?;
        org.alias_refs = aliases.remove(&org.id).unwrap_or_default();
        catalog.push(org);
    }
    Ok(catalog)
}

impl AimsService {
    /// Create an organization and claim its canonical and alias refs.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Core` for a blank name and
    /// `DatabaseError::AliasConflict` if any identifier is already taken.
    pub async fn create_organization(
        &self,
        new: &NewOrganization,
    ) -> Result<Organization, DatabaseError> {
        let new = new.normalized()?;
        let _guard = self.write_lock().await;

        let tx = self.db().conn().transaction().await?;
        match insert_organization(&tx, &new).await {
            Ok(org) => {
                tx.commit().await?;
                tracing::info!(id = %org.id, name = %org.name, "organization created");
                Ok(org)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if no organization has this id.
    pub async fn get_organization(&self, id: &str) -> Result<Organization, DatabaseError> {
        let _guard = self.read_lock().await;
        fetch_organization(self.db().conn(), id)
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Every organization, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_organizations(&self) -> Result<Vec<Organization>, DatabaseError> {
        let _guard = self.read_lock().await;
        fetch_catalog(self.db().conn()).await
    }

    /// Apply an update. Alias lists replace the stored lists after
    /// normalization; the canonical ref never changes.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for an unknown id,
    /// `DatabaseError::Core` for a blank name, and
    /// `DatabaseError::AliasConflict` if an alias ref belongs to another
    /// organization.
    pub async fn update_organization(
        &self,
        id: &str,
        update: &OrganizationUpdate,
    ) -> Result<Organization, DatabaseError> {
        let _guard = self.write_lock().await;
        let tx = self.db().conn().transaction().await?;
        match apply_update(&tx, id, update).await {
            Ok(org) => {
                tx.commit().await?;
                tracing::info!(id = %org.id, "organization updated");
                Ok(org)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Replace an organization's alias refs and name aliases.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_organization`].
    pub async fn update_entity_aliases(
        &self,
        id: &str,
        alias_refs: &[String],
        name_aliases: &[String],
    ) -> Result<Organization, DatabaseError> {
        let update = OrganizationUpdate {
            alias_refs: Some(alias_refs.to_vec()),
            name_aliases: Some(name_aliases.to_vec()),
            ..OrganizationUpdate::default()
        };
        self.update_organization(id, &update).await
    }

    /// Delete an organization. Its identifiers go with it; audit entries
    /// keep their name snapshot and lose the link.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for an unknown id, or a libSQL
    /// constraint error while committed activity data still points at it.
    pub async fn delete_organization(&self, id: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_lock().await;
        let affected = self
            .db()
            .conn()
            .execute("DELETE FROM organizations WHERE id = ?1", libsql::params![id])
            .await?;
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        tracing::info!(id, "organization deleted");
        Ok(())
    }

    /// Resolve one reference against the current catalog.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the catalog cannot be read.
    pub async fn resolve_reference(
        &self,
        reference: &Reference,
    ) -> Result<ResolutionResult, DatabaseError> {
        let catalog = {
            let _guard = self.read_lock().await;
            fetch_catalog(self.db().conn()).await?
        };
        let resolver = Resolver::new(&catalog, self.similarity(), self.resolver_settings());
        Ok(resolver.resolve(reference))
    }

    /// Rank organizations by name and name-alias similarity to `query`.
    ///
    /// Advisory only: used to offer link candidates, never to resolve.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the catalog cannot be read.
    pub async fn search_organizations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateMatch>, DatabaseError> {
        let catalog = {
            let _guard = self.read_lock().await;
            fetch_catalog(self.db().conn()).await?
        };
        let resolver = Resolver::new(&catalog, self.similarity(), self.resolver_settings());
        Ok(resolver.rank(query, limit))
    }
}

async fn apply_update(
    conn: &libsql::Connection,
    id: &str,
    update: &OrganizationUpdate,
) -> Result<Organization, DatabaseError> {
    let mut org = fetch_organization(conn, id)
        .await?
        .ok_or(DatabaseError::NoResult)?;

    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("organization name must not be empty".into()).into());
        }
        org.name = name.to_string();
    }
    if let Some(org_type) = update.org_type {
        org.org_type = org_type;
    }

    if let Some(alias_refs) = &update.alias_refs {
        let alias_refs = normalize_alias_refs(alias_refs, org.canonical_ref.as_deref());
        if let Some(conflict) =
            find_conflict(conn, alias_refs.iter().map(String::as_str), Some(id)).await?
        {
            return Err(conflict);
        }
        conn.execute(
            "DELETE FROM organization_identifiers WHERE organization_id = ?1 AND kind = 'alias'",
            libsql::params![id],
        )
        .await?;
        for (position, alias) in alias_refs.iter().enumerate() {
            claim_identifier(conn, alias, id, IdentifierKind::Alias, position).await?;
        }
        org.alias_refs = alias_refs;
    }

    let name_aliases = update.name_aliases.as_ref().unwrap_or(&org.name_aliases);
    org.name_aliases = normalize_name_aliases(name_aliases, &org.name);
    org.updated_at = Utc::now();

    conn.execute(
        "UPDATE organizations SET name = ?1, org_type = ?2, name_aliases = ?3, updated_at = ?4
         WHERE id = ?5",
        libsql::params![
            org.name.as_str(),
            org.org_type.as_str(),
            to_json(&org.name_aliases)?,
            org.updated_at.to_rfc3339(),
            id
        ],
    )
    .await?;
    Ok(org)
}

#[cfg(test)]
mod tests {
    use crate::error::DatabaseError;
    use crate::test_support::helpers::test_service;
    use crate::updates::organization::OrganizationUpdateBuilder;
    use aims_core::entities::NewOrganization;
    use aims_core::enums::OrgType;
    use pretty_assertions::assert_eq;

    fn koica() -> NewOrganization {
        NewOrganization {
            name: "Korea International Cooperation Agency".into(),
            canonical_ref: Some("KR-GOV-010".into()),
            org_type: Some(OrgType::Government),
            alias_refs: vec!["010712".into()],
            name_aliases: vec!["KOICA".into()],
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let svc = test_service().await;
        let created = svc.create_organization(&koica()).await.unwrap();
        assert!(created.id.starts_with("org-"));

        let fetched = svc.get_organization(&created.id).await.unwrap();
        assert_eq!(fetched.canonical_ref.as_deref(), Some("KR-GOV-010"));
        assert_eq!(fetched.alias_refs, vec!["010712".to_string()]);
        assert_eq!(fetched.name_aliases, vec!["KOICA".to_string()]);
        assert_eq!(fetched.org_type, OrgType::Government);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let svc = test_service().await;
        let err = svc
            .create_organization(&NewOrganization::named("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn canonical_ref_cannot_be_claimed_as_another_alias() {
        let svc = test_service().await;
        let koica = svc.create_organization(&koica()).await.unwrap();

        let other = NewOrganization {
            name: "Someone Else".into(),
            alias_refs: vec!["kr-gov-010".into()],
            ..NewOrganization::default()
        };
        let err = svc.create_organization(&other).await.unwrap_err();
        match err {
            DatabaseError::AliasConflict {
                value,
                conflicting_entity_id,
            } => {
                assert_eq!(value, "kr-gov-010");
                assert_eq!(conflicting_entity_id, koica.id);
            }
            other => panic!("expected AliasConflict, got {other:?}"),
        }
        assert_eq!(svc.list_organizations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_aliases_normalizes_and_checks_namespace() {
        let svc = test_service().await;
        let koica = svc.create_organization(&koica()).await.unwrap();
        let undp = svc
            .create_organization(&NewOrganization {
                name: "UNDP".into(),
                canonical_ref: Some("XM-DAC-41114".into()),
                ..NewOrganization::default()
            })
            .await
            .unwrap();

        let updated = svc
            .update_entity_aliases(
                &koica.id,
                &[" 010712".into(), "010712".into(), "KR-GOV-010".into(), "KOICA-7".into()],
                &["koica".into(), "KOICA".into(), " ".into()],
            )
            .await
            .unwrap();
        assert_eq!(updated.alias_refs, vec!["010712".to_string(), "KOICA-7".to_string()]);
        assert_eq!(updated.name_aliases, vec!["koica".to_string()]);

        let err = svc
            .update_entity_aliases(&undp.id, &["koica-7".into()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AliasConflict { .. }), "got {err:?}");
        assert!(svc.get_organization(&undp.id).await.unwrap().alias_refs.is_empty());
    }

    #[tokio::test]
    async fn update_builder_renames() {
        let svc = test_service().await;
        let koica = svc.create_organization(&koica()).await.unwrap();
        let update = OrganizationUpdateBuilder::new()
            .name("KOICA (Korea)")
            .org_type(OrgType::Government)
            .build();
        let updated = svc.update_organization(&koica.id, &update).await.unwrap();
        assert_eq!(updated.name, "KOICA (Korea)");
        assert_eq!(updated.alias_refs, vec!["010712".to_string()]);
    }

    #[tokio::test]
    async fn delete_unknown_is_no_result() {
        let svc = test_service().await;
        assert!(matches!(
            svc.delete_organization("org-00000000").await,
            Err(DatabaseError::NoResult)
        ));
    }

    #[tokio::test]
    async fn search_ranks_by_name_and_alias() {
        let svc = test_service().await;
        svc.create_organization(&koica()).await.unwrap();
        svc.create_organization(&NewOrganization::named("World Bank Group"))
            .await
            .unwrap();

        let hits = svc.search_organizations("World Bank", 5).await.unwrap();
        assert_eq!(hits[0].name, "World Bank Group");
        assert!(hits.iter().all(|h| h.name != "Korea International Cooperation Agency"));
    }

    #[tokio::test]
    async fn reads_wait_for_an_open_write() {
        let svc = test_service().await;
        let guard = svc.write_lock().await;
        let tx = svc.db().conn().transaction().await.unwrap();
        super::insert_organization(&tx, &NewOrganization::named("Pending Donor"))
            .await
            .unwrap();

        let wait = std::time::Duration::from_millis(50);
        assert!(tokio::time::timeout(wait, svc.list_organizations()).await.is_err());
        assert!(
            tokio::time::timeout(wait, svc.search_organizations("Pending Donor", 5))
                .await
                .is_err()
        );

        tx.rollback().await.unwrap();
        drop(guard);
        assert!(svc.list_organizations().await.unwrap().is_empty());
    }
}

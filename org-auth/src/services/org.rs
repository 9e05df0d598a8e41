//! Organization membership and role resolution.

use std::sync::Arc;
use uuid::Uuid;

use super::{AuthRepository, ServiceError};
use crate::models::{OrgMembership, OrgRole, RoleMapping, RoleReconcile};

#[derive(Clone)]
pub struct OrgRoleResolver {
    repo: Arc<dyn AuthRepository>,
}

impl OrgRoleResolver {
    pub fn new(repo: Arc<dyn AuthRepository>) -> Self {
        Self { repo }
    }

    /// Create the membership at `default_role` if absent; an existing role is
    /// returned unchanged.
    pub async fn ensure_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        default_role: OrgRole,
    ) -> Result<OrgRole, ServiceError> {
        self.repo
            .upsert_membership(org_id, user_id, default_role, RoleReconcile::KeepExisting)
            .await
    }

    pub async fn get_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgRole>, ServiceError> {
        self.repo.get_membership_role(org_id, user_id).await
    }

    /// Highest role mapped from the asserted IdP groups, or `None` when no
    /// group is asserted or none is mapped.
    ///
    /// Owner is never produced, even if such a mapping exists in storage.
    pub async fn apply_group_role_mappings(
        &self,
        org_id: Uuid,
        provider: &str,
        group_ids: &[String],
    ) -> Result<Option<OrgRole>, ServiceError> {
        if group_ids.is_empty() {
            return Ok(None);
        }

        let mappings = self
            .repo
            .list_role_mappings(org_id, provider, group_ids)
            .await?;

        Ok(mappings
            .into_iter()
            .filter(|m| {
                if !m.role.is_grantable() {
                    tracing::warn!(
                        org_id = %org_id,
                        group_id = %m.group_id,
                        "Ignoring group mapping to a non-grantable role"
                    );
                }
                m.role.is_grantable()
            })
            .map(|m| m.role)
            .max())
    }

    /// Upsert the membership at a mapped role, raising a lower existing role.
    /// This is the only automatic elevation path.
    pub async fn grant_mapped_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> Result<OrgRole, ServiceError> {
        if !role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        let effective = self
            .repo
            .upsert_membership(org_id, user_id, role, RoleReconcile::Elevate)
            .await?;
        tracing::info!(
            org_id = %org_id,
            user_id = %user_id,
            role = %effective,
            "Applied mapped role"
        );
        Ok(effective)
    }

    /// Resolve the sign-in role for an IdP login bound to `org_id`: the best
    /// mapped role if any group matches, else ensure `default_role`.
    pub async fn resolve_sign_in_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        provider: &str,
        group_ids: &[String],
        default_role: OrgRole,
    ) -> Result<OrgRole, ServiceError> {
        match self
            .apply_group_role_mappings(org_id, provider, group_ids)
            .await?
        {
            Some(mapped) => self.grant_mapped_role(org_id, user_id, mapped).await,
            None => self.ensure_membership(org_id, user_id, default_role).await,
        }
    }

    pub async fn set_group_role_mapping(
        &self,
        org_id: Uuid,
        provider: &str,
        group_id: &str,
        role: OrgRole,
    ) -> Result<(), ServiceError> {
        if !role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        self.repo
            .set_role_mapping(&RoleMapping {
                org_id,
                provider: provider.to_string(),
                group_id: group_id.to_string(),
                role,
            })
            .await
    }

    pub async fn list_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, ServiceError> {
        self.repo.list_user_memberships(user_id).await
    }

    /// Default active organization: highest role, then oldest membership.
    pub async fn pick_active_org(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        Ok(self
            .repo
            .list_user_memberships(user_id)
            .await?
            .first()
            .map(|m| m.org_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;
    use crate::services::InMemoryRepository;

    async fn setup() -> (OrgRoleResolver, Arc<InMemoryRepository>, Uuid) {
        let repo = Arc::new(InMemoryRepository::new());
        let org = Organization::new("acme", "Acme", Some("tenant-1".into()));
        repo.create_organization(&org).await.unwrap();
        (OrgRoleResolver::new(repo.clone()), repo, org.org_id)
    }

    #[tokio::test]
    async fn test_ensure_membership_never_changes_existing_role() {
        let (r, _, org) = setup().await;
        let user = Uuid::new_v4();

        let first = r.ensure_membership(org, user, OrgRole::Admin).await.unwrap();
        assert_eq!(first, OrgRole::Admin);
        let again = r.ensure_membership(org, user, OrgRole::Viewer).await.unwrap();
        assert_eq!(again, OrgRole::Admin);
        assert_eq!(r.get_role(org, user).await.unwrap(), Some(OrgRole::Admin));
    }

    #[tokio::test]
    async fn test_mapping_precedence_picks_highest() {
        let (r, _, org) = setup().await;
        r.set_group_role_mapping(org, "oidc", "G1", OrgRole::Member).await.unwrap();
        r.set_group_role_mapping(org, "oidc", "G2", OrgRole::Admin).await.unwrap();

        let groups = vec!["G1".to_string(), "G2".to_string()];
        assert_eq!(
            r.apply_group_role_mappings(org, "oidc", &groups).await.unwrap(),
            Some(OrgRole::Admin)
        );
    }

    #[tokio::test]
    async fn test_no_groups_or_no_match_is_none() {
        let (r, _, org) = setup().await;
        r.set_group_role_mapping(org, "oidc", "G1", OrgRole::Member).await.unwrap();

        assert_eq!(r.apply_group_role_mappings(org, "oidc", &[]).await.unwrap(), None);
        assert_eq!(
            r.apply_group_role_mappings(org, "oidc", &["other".to_string()]).await.unwrap(),
            None
        );
        // Mappings are scoped by provider.
        assert_eq!(
            r.apply_group_role_mappings(org, "saml", &["G1".to_string()]).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_owner_mapping_is_rejected() {
        let (r, _, org) = setup().await;
        let err = r
            .set_group_role_mapping(org, "oidc", "G1", OrgRole::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRole));
    }

    #[tokio::test]
    async fn test_sign_in_role_elevates_but_never_downgrades() {
        let (r, _, org) = setup().await;
        let user = Uuid::new_v4();
        r.set_group_role_mapping(org, "oidc", "admins", OrgRole::Admin)
            .await
            .unwrap();
        r.set_group_role_mapping(org, "oidc", "viewers", OrgRole::Viewer)
            .await
            .unwrap();

        r.ensure_membership(org, user, OrgRole::Member).await.unwrap();
        let admin = vec!["admins".to_string()];
        assert_eq!(
            r.resolve_sign_in_role(org, user, "oidc", &admin, OrgRole::Member).await.unwrap(),
            OrgRole::Admin
        );

        let viewer = vec!["viewers".to_string()];
        assert_eq!(
            r.resolve_sign_in_role(org, user, "oidc", &viewer, OrgRole::Member).await.unwrap(),
            OrgRole::Admin
        );
    }

    #[tokio::test]
    async fn test_sign_in_without_mapping_uses_default() {
        let (r, _, org) = setup().await;
        let user = Uuid::new_v4();
        assert_eq!(
            r.resolve_sign_in_role(org, user, "oidc", &[], OrgRole::Member).await.unwrap(),
            OrgRole::Member
        );
    }
}

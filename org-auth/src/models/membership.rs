use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::OrgRole;

/// How an upsert treats a membership that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleReconcile {
    /// Leave the stored role untouched.
    KeepExisting,
    /// Raise the stored role to the requested one; never lowers it.
    Elevate,
}

impl RoleReconcile {
    /// Role that results from applying `requested` over `existing`.
    pub fn resolve(self, existing: Option<OrgRole>, requested: OrgRole) -> OrgRole {
        match (self, existing) {
            (_, None) => requested,
            (RoleReconcile::KeepExisting, Some(current)) => current,
            (RoleReconcile::Elevate, Some(current)) => current.max(requested),
        }
    }
}

/// A membership joined with its organization, as listed for the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgMembership {
    pub org_id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub role: OrgRole,
    pub created_utc: DateTime<Utc>,
}

/// Configured (org, provider, group) -> role mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleMapping {
    pub org_id: Uuid,
    pub provider: String,
    pub group_id: String,
    pub role: OrgRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_existing_never_changes_role() {
        let r = RoleReconcile::KeepExisting;
        assert_eq!(r.resolve(Some(OrgRole::Viewer), OrgRole::Admin), OrgRole::Viewer);
        assert_eq!(r.resolve(Some(OrgRole::Admin), OrgRole::Viewer), OrgRole::Admin);
        assert_eq!(r.resolve(None, OrgRole::Member), OrgRole::Member);
    }

    #[test]
    fn test_elevate_only_raises() {
        let r = RoleReconcile::Elevate;
        assert_eq!(r.resolve(Some(OrgRole::Viewer), OrgRole::Admin), OrgRole::Admin);
        assert_eq!(r.resolve(Some(OrgRole::Owner), OrgRole::Member), OrgRole::Owner);
    }
}

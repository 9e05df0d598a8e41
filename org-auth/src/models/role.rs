//! Organization roles and their privilege order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role held by a user inside one organization.
///
/// Variants are declared in privilege order so the derived `Ord` gives
/// Viewer < Member < Admin < Owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl OrgRole {
    pub const ALL: [OrgRole; 4] = [
        OrgRole::Viewer,
        OrgRole::Member,
        OrgRole::Admin,
        OrgRole::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Viewer => "Viewer",
            OrgRole::Member => "Member",
            OrgRole::Admin => "Admin",
            OrgRole::Owner => "Owner",
        }
    }

    /// Numeric rank persisted next to the role so storage can compare roles.
    pub fn rank(&self) -> i16 {
        match self {
            OrgRole::Viewer => 1,
            OrgRole::Member => 2,
            OrgRole::Admin => 3,
            OrgRole::Owner => 4,
        }
    }

    /// Whether this role may be handed out by an invite or an IdP group mapping.
    pub fn is_grantable(&self) -> bool {
        *self != OrgRole::Owner
    }

    pub fn satisfies(&self, minimum: OrgRole) -> bool {
        *self >= minimum
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role")]
pub struct InvalidRole;

impl FromStr for OrgRole {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(OrgRole::Viewer),
            "member" => Ok(OrgRole::Member),
            "admin" => Ok(OrgRole::Admin),
            "owner" => Ok(OrgRole::Owner),
            _ => Err(InvalidRole),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order() {
        assert!(OrgRole::Viewer < OrgRole::Member);
        assert!(OrgRole::Member < OrgRole::Admin);
        assert!(OrgRole::Admin < OrgRole::Owner);
        assert_eq!(
            [OrgRole::Member, OrgRole::Admin, OrgRole::Viewer].iter().max(),
            Some(&OrgRole::Admin)
        );
    }

    #[test]
    fn test_rank_matches_order() {
        for pair in OrgRole::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("admin".parse::<OrgRole>().unwrap(), OrgRole::Admin);
        assert_eq!(" OWNER ".parse::<OrgRole>().unwrap(), OrgRole::Owner);
        assert_eq!("Viewer".parse::<OrgRole>().unwrap(), OrgRole::Viewer);
        assert!("superuser".parse::<OrgRole>().is_err());
    }

    #[test]
    fn test_owner_is_not_grantable() {
        assert!(!OrgRole::Owner.is_grantable());
        assert!(OrgRole::Admin.is_grantable());
    }

    #[test]
    fn test_satisfies() {
        assert!(OrgRole::Owner.satisfies(OrgRole::Admin));
        assert!(OrgRole::Admin.satisfies(OrgRole::Admin));
        assert!(!OrgRole::Member.satisfies(OrgRole::Admin));
    }
}

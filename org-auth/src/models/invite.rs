//! Invite model - one-time, hashed, expiring organization membership grants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{user::normalize_email, OrgRole};

/// Invite entity. Only the token hash is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub invite_id: Uuid,
    pub org_id: Uuid,
    pub inviter_user_id: Uuid,
    pub email: String,
    pub role: OrgRole,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Invite {
    pub fn new(
        org_id: Uuid,
        inviter_user_id: Uuid,
        email: &str,
        role: OrgRole,
        token_hash: String,
        expiry_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            invite_id: Uuid::new_v4(),
            org_id,
            inviter_user_id,
            email: normalize_email(email),
            role,
            token_hash,
            expiry_utc,
            used_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_utc.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_utc
    }

    /// Unused and not past expiry.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired(now)
    }
}

//! Persistence boundary consumed by the authentication core.
//!
//! Every method that guards an invariant under concurrency (first-login user
//! creation, identity binding, membership reconciliation, invite redemption,
//! TOTP step consumption) is a single atomic operation in the implementation,
//! never a read followed by a write in the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ServiceError;
use crate::models::{
    Invite, LocalCredential, OrgMembership, OrgRole, Organization, RoleMapping, RoleReconcile,
    TotpSecret, User, UserIdentity,
};

/// Result of a successful invite redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemedInvite {
    pub org_id: Uuid,
    /// Membership role after reconciliation with any existing membership.
    pub role: OrgRole,
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    // ==================== User Operations ====================

    /// Insert the user if no user has this email, otherwise return the existing row.
    async fn upsert_user_by_email(&self, user: &User) -> Result<User, ServiceError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    /// Create a user together with its local credential.
    ///
    /// Fails with `EmailAlreadyRegistered` and writes nothing when the email exists.
    async fn create_user_with_credential(
        &self,
        user: &User,
        credential: &LocalCredential,
    ) -> Result<(), ServiceError>;

    // ==================== Identity Operations ====================

    /// Bind (provider, subject) to `identity.user_id` unless already bound.
    /// Returns the user the pair is bound to after the call.
    async fn link_identity(&self, identity: &UserIdentity) -> Result<Uuid, ServiceError>;

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserIdentity>, ServiceError>;

    // ==================== Organization Operations ====================

    async fn create_organization(&self, org: &Organization) -> Result<(), ServiceError>;

    async fn find_organization_by_slug(&self, slug: &str)
        -> Result<Option<Organization>, ServiceError>;

    async fn find_organization_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<Organization>, ServiceError>;

    // ==================== Membership Operations ====================

    /// Create the membership at `role` or reconcile an existing one per `reconcile`.
    /// Returns the stored role afterwards.
    async fn upsert_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
        reconcile: RoleReconcile,
    ) -> Result<OrgRole, ServiceError>;

    async fn get_membership_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgRole>, ServiceError>;

    /// Memberships of a user, highest role first, then oldest first.
    async fn list_user_memberships(&self, user_id: Uuid)
        -> Result<Vec<OrgMembership>, ServiceError>;

    // ==================== Role Mapping Operations ====================

    async fn set_role_mapping(&self, mapping: &RoleMapping) -> Result<(), ServiceError>;

    async fn list_role_mappings(
        &self,
        org_id: Uuid,
        provider: &str,
        group_ids: &[String],
    ) -> Result<Vec<RoleMapping>, ServiceError>;

    // ==================== Invite Operations ====================

    async fn create_invite(&self, invite: &Invite) -> Result<(), ServiceError>;

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, ServiceError>;

    /// Mark the invite used and grant its membership in one atomic step.
    ///
    /// The mark is conditioned on the invite being unused and unexpired at
    /// `now`; `None` means another redemption won or the invite lapsed, and
    /// nothing was written.
    async fn redeem_invite(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RedeemedInvite>, ServiceError>;

    // ==================== Credential Operations ====================

    async fn find_credential_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalCredential>, ServiceError>;

    async fn find_credential_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LocalCredential>, ServiceError>;

    /// Create or replace the user's credential in place.
    async fn upsert_credential(&self, credential: &LocalCredential) -> Result<(), ServiceError>;

    // ==================== TOTP Operations ====================

    /// Store a pending enrollment. Returns false, writing nothing, when the
    /// user already has a confirmed one.
    async fn save_pending_totp(&self, secret: &TotpSecret) -> Result<bool, ServiceError>;

    async fn find_totp_secret(&self, user_id: Uuid) -> Result<Option<TotpSecret>, ServiceError>;

    /// Confirm the pending enrollment holding `secret`, recording `step` as used.
    async fn confirm_totp(
        &self,
        user_id: Uuid,
        secret: &str,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Record `step` as used if it is newer than the last accepted step.
    async fn consume_totp_step(&self, user_id: Uuid, step: i64) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

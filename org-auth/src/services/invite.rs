//! Invite issuance and redemption.
//!
//! An invite is `Created` until it is either accepted (terminal, stored) or
//! passes its expiry (terminal, derived at read time). Only the sha256 of the
//! bearer token is persisted.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthRepository, ServiceError, SessionStore};
use crate::models::{Invite, OrgRole, Session, SessionHandle, User};
use crate::utils::{generate_secure_token, hash_token};

pub const DEFAULT_INVITE_TTL_HOURS: i64 = 168;

/// A freshly created invite and its plaintext token, available only here.
pub struct IssuedInvite {
    pub invite: Invite,
    pub token: String,
}

impl std::fmt::Debug for IssuedInvite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedInvite")
            .field("invite", &self.invite)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Outcome of a redemption: the granted membership and the rotated session.
#[derive(Debug)]
pub struct AcceptedInvite {
    pub org_id: Uuid,
    pub role: OrgRole,
    pub session: Session,
    pub handle: SessionHandle,
}

#[derive(Clone)]
pub struct InviteManager {
    repo: Arc<dyn AuthRepository>,
    sessions: Arc<dyn SessionStore>,
    invite_ttl: Duration,
    session_ttl: Duration,
}

impl InviteManager {
    pub fn new(
        repo: Arc<dyn AuthRepository>,
        sessions: Arc<dyn SessionStore>,
        invite_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            sessions,
            invite_ttl,
            session_ttl,
        }
    }

    /// Parse a role name for an invite. Owner and unknown names are rejected.
    pub fn parse_grantable_role(raw: &str) -> Result<OrgRole, ServiceError> {
        let role: OrgRole = raw.parse().map_err(|_| ServiceError::InvalidRole)?;
        if !role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        Ok(role)
    }

    /// Persist an invite for an already-hashed token.
    pub async fn create_invite(
        &self,
        org_id: Uuid,
        inviter_id: Uuid,
        email: &str,
        role: OrgRole,
        token_hash: String,
        expiry: DateTime<Utc>,
    ) -> Result<Invite, ServiceError> {
        if !role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        if !email.contains('@') {
            return Err(ServiceError::Validation("invalid email".to_string()));
        }

        let invite = Invite::new(org_id, inviter_id, email, role, token_hash, expiry);

        self.repo.create_invite(&invite).await?;
        tracing::info!(
            invite_id = %invite.invite_id,
            org_id = %org_id,
            inviter_id = %inviter_id,
            role = %role,
            "Invite created"
        );
        Ok(invite)
    }

    /// Generate a token, store its hash and return the plaintext once.
    ///
    /// The role is checked before any token is generated.
    pub async fn issue_invite(
        &self,
        org_id: Uuid,
        inviter_id: Uuid,
        email: &str,
        role: OrgRole,
    ) -> Result<IssuedInvite, ServiceError> {
        if !role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }

        let token = generate_secure_token();
        let expiry = Utc::now() + self.invite_ttl;
        let invite = self
            .create_invite(org_id, inviter_id, email, role, hash_token(&token), expiry)
            .await?;

        Ok(IssuedInvite { invite, token })
    }

    pub async fn get_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, ServiceError> {
        self.repo.find_invite_by_token_hash(token_hash).await
    }

    /// Redeem `token` for the authenticated `user`.
    ///
    /// Marking the invite used and granting the membership happen in one
    /// conditional storage step, so concurrent redemptions of one token
    /// produce exactly one success. The caller's session is then replaced by
    /// one bound to the invited organization.
    #[tracing::instrument(skip_all, fields(user_id = %user.user_id))]
    pub async fn accept_invite(
        &self,
        token: &str,
        user: &User,
        current_handle: &SessionHandle,
        current: &Session,
    ) -> Result<AcceptedInvite, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::InvalidInvite);
        }

        let invite = self
            .repo
            .find_invite_by_token_hash(&hash_token(token))
            .await?
            .ok_or(ServiceError::InvalidInvite)?;

        let now = Utc::now();
        if !invite.is_redeemable(now) {
            return Err(ServiceError::InviteExpiredOrUsed);
        }

        if !user.email_matches(&invite.email) {
            tracing::warn!(invite_id = %invite.invite_id, "Invite presented by a different email");
            return Err(ServiceError::EmailMismatch);
        }

        let redeemed = self
            .repo
            .redeem_invite(invite.invite_id, user.user_id, now)
            .await?
            .ok_or(ServiceError::InviteExpiredOrUsed)?;

        let session = Session::new(
            user.user_id,
            Some(redeemed.org_id),
            &current.provider,
            self.session_ttl,
        );
        let handle = self.sessions.create(&session).await?;
        self.sessions.invalidate(current_handle).await?;

        tracing::info!(
            invite_id = %invite.invite_id,
            org_id = %redeemed.org_id,
            role = %redeemed.role,
            "Invite accepted"
        );

        Ok(AcceptedInvite {
            org_id: redeemed.org_id,
            role: redeemed.role,
            session,
            handle,
        })
    }
}

//! In-process implementation of [`AuthRepository`].
//!
//! Backs tests and dev runs without `DATABASE_URL`. All state sits behind one
//! mutex that is never held across an await, so each trait method is atomic
//! in the same way the SQL statements of the Postgres implementation are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::repository::{AuthRepository, RedeemedInvite};
use super::ServiceError;
use crate::models::{
    user::normalize_email, Invite, LocalCredential, OrgMembership, OrgRole, Organization,
    RoleMapping, RoleReconcile, TotpSecret, User, UserIdentity,
};

#[derive(Debug, Clone)]
struct MembershipEntry {
    role: OrgRole,
    created_utc: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
    identities: HashMap<(String, String), UserIdentity>,
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<(Uuid, Uuid), MembershipEntry>,
    role_mappings: HashMap<(Uuid, String, String), OrgRole>,
    invites: HashMap<String, Invite>,
    credentials: HashMap<Uuid, LocalCredential>,
    totp: HashMap<Uuid, TotpSecret>,
}

impl MemoryState {
    fn upsert_membership(
        &mut self,
        org_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
        reconcile: RoleReconcile,
    ) -> OrgRole {
        let entry = self
            .memberships
            .entry((org_id, user_id))
            .or_insert_with(|| MembershipEntry {
                role,
                created_utc: Utc::now(),
            });
        entry.role = reconcile.resolve(Some(entry.role), role);
        entry.role
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ServiceError> {
        self.state
            .lock()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("repository lock poisoned")))
    }
}

#[async_trait]
impl AuthRepository for InMemoryRepository {
    async fn upsert_user_by_email(&self, user: &User) -> Result<User, ServiceError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .users_by_email
            .get(&user.email)
            .and_then(|id| state.users.get(id))
        {
            return Ok(existing.clone());
        }
        state.users_by_email.insert(user.email.clone(), user.user_id);
        state.users.insert(user.user_id, user.clone());
        Ok(user.clone())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let state = self.lock()?;
        Ok(state
            .users_by_email
            .get(&normalize_email(email))
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn create_user_with_credential(
        &self,
        user: &User,
        credential: &LocalCredential,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.users_by_email.contains_key(&user.email) {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        state.users_by_email.insert(user.email.clone(), user.user_id);
        state.users.insert(user.user_id, user.clone());
        state.credentials.insert(user.user_id, credential.clone());
        Ok(())
    }

    async fn link_identity(&self, identity: &UserIdentity) -> Result<Uuid, ServiceError> {
        let mut state = self.lock()?;
        let bound = state
            .identities
            .entry((identity.provider.clone(), identity.subject.clone()))
            .or_insert_with(|| identity.clone());
        Ok(bound.user_id)
    }

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserIdentity>, ServiceError> {
        Ok(self
            .lock()?
            .identities
            .get(&(provider.to_string(), subject.to_string()))
            .cloned())
    }

    async fn create_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let clash = state.organizations.values().any(|o| {
            o.slug == org.slug || (o.tenant_id.is_some() && o.tenant_id == org.tenant_id)
        });
        if clash {
            return Err(ServiceError::Validation(
                "organization slug or tenant already in use".to_string(),
            ));
        }
        state.organizations.insert(org.org_id, org.clone());
        Ok(())
    }

    async fn find_organization_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        let slug = slug.to_lowercase();
        Ok(self
            .lock()?
            .organizations
            .values()
            .find(|o| o.slug == slug)
            .cloned())
    }

    async fn find_organization_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self
            .lock()?
            .organizations
            .values()
            .find(|o| o.tenant_id.as_deref() == Some(tenant_id))
            .cloned())
    }

    async fn upsert_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
        reconcile: RoleReconcile,
    ) -> Result<OrgRole, ServiceError> {
        Ok(self.lock()?.upsert_membership(org_id, user_id, role, reconcile))
    }

    async fn get_membership_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgRole>, ServiceError> {
        Ok(self
            .lock()?
            .memberships
            .get(&(org_id, user_id))
            .map(|m| m.role))
    }

    async fn list_user_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, ServiceError> {
        let state = self.lock()?;
        let mut memberships: Vec<OrgMembership> = state
            .memberships
            .iter()
            .filter(|((_, member), _)| *member == user_id)
            .filter_map(|((org_id, _), entry)| {
                state.organizations.get(org_id).map(|org| OrgMembership {
                    org_id: org.org_id,
                    slug: org.slug.clone(),
                    display_name: org.display_name.clone(),
                    role: entry.role,
                    created_utc: entry.created_utc,
                })
            })
            .collect();

        memberships.sort_by(|a, b| {
            b.role
                .cmp(&a.role)
                .then(a.created_utc.cmp(&b.created_utc))
                .then(a.slug.cmp(&b.slug))
        });
        Ok(memberships)
    }

    async fn set_role_mapping(&self, mapping: &RoleMapping) -> Result<(), ServiceError> {
        if !mapping.role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        self.lock()?.role_mappings.insert(
            (
                mapping.org_id,
                mapping.provider.clone(),
                mapping.group_id.clone(),
            ),
            mapping.role,
        );
        Ok(())
    }

    async fn list_role_mappings(
        &self,
        org_id: Uuid,
        provider: &str,
        group_ids: &[String],
    ) -> Result<Vec<RoleMapping>, ServiceError> {
        let state = self.lock()?;
        Ok(group_ids
            .iter()
            .filter_map(|group_id| {
                state
                    .role_mappings
                    .get(&(org_id, provider.to_string(), group_id.clone()))
                    .map(|role| RoleMapping {
                        org_id,
                        provider: provider.to_string(),
                        group_id: group_id.clone(),
                        role: *role,
                    })
            })
            .collect())
    }

    async fn create_invite(&self, invite: &Invite) -> Result<(), ServiceError> {
        if !invite.role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        let mut state = self.lock()?;
        if state.invites.contains_key(&invite.token_hash) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "duplicate invite token hash"
            )));
        }
        state
            .invites
            .insert(invite.token_hash.clone(), invite.clone());
        Ok(())
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, ServiceError> {
        Ok(self.lock()?.invites.get(token_hash).cloned())
    }

    async fn redeem_invite(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RedeemedInvite>, ServiceError> {
        let mut state = self.lock()?;
        let Some(invite) = state
            .invites
            .values_mut()
            .find(|i| i.invite_id == invite_id)
        else {
            return Ok(None);
        };
        if !invite.is_redeemable(now) {
            return Ok(None);
        }
        invite.used_utc = Some(now);
        let (org_id, invited_role) = (invite.org_id, invite.role);

        let role = state.upsert_membership(org_id, user_id, invited_role, RoleReconcile::Elevate);
        Ok(Some(RedeemedInvite { org_id, role }))
    }

    async fn find_credential_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalCredential>, ServiceError> {
        let username = normalize_email(username);
        Ok(self
            .lock()?
            .credentials
            .values()
            .find(|c| c.username == username)
            .cloned())
    }

    async fn find_credential_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LocalCredential>, ServiceError> {
        Ok(self.lock()?.credentials.get(&user_id).cloned())
    }

    async fn upsert_credential(&self, credential: &LocalCredential) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        match state.credentials.get_mut(&credential.user_id) {
            Some(existing) => {
                existing.username = credential.username.clone();
                existing.password_hash = credential.password_hash.clone();
                existing.updated_utc = credential.updated_utc;
            }
            None => {
                state
                    .credentials
                    .insert(credential.user_id, credential.clone());
            }
        }
        Ok(())
    }

    async fn save_pending_totp(&self, secret: &TotpSecret) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        if state
            .totp
            .get(&secret.user_id)
            .is_some_and(TotpSecret::is_confirmed)
        {
            return Ok(false);
        }
        state.totp.insert(secret.user_id, secret.clone());
        Ok(true)
    }

    async fn find_totp_secret(&self, user_id: Uuid) -> Result<Option<TotpSecret>, ServiceError> {
        Ok(self.lock()?.totp.get(&user_id).cloned())
    }

    async fn confirm_totp(
        &self,
        user_id: Uuid,
        secret: &str,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.totp.get_mut(&user_id) {
            Some(t) if !t.is_confirmed() && t.secret == secret => {
                t.confirmed_utc = Some(now);
                t.last_used_step = Some(step);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_totp_step(&self, user_id: Uuid, step: i64) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.totp.get_mut(&user_id) {
            Some(t) if t.last_used_step.map_or(true, |last| last < step) => {
                t.last_used_step = Some(step);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }
}

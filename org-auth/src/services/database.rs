//! PostgreSQL implementation of [`AuthRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use super::repository::{AuthRepository, RedeemedInvite};
use super::ServiceError;
use crate::models::{
    user::normalize_email, Invite, LocalCredential, OrgMembership, OrgRole, Organization,
    RoleMapping, RoleReconcile, TotpSecret, User, UserIdentity,
};

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> Result<OrgRole, ServiceError> {
    OrgRole::from_str(raw)
        .map_err(|_| ServiceError::Internal(anyhow::anyhow!("unknown role '{}' in storage", raw)))
}

#[derive(FromRow)]
struct InviteRow {
    invite_id: Uuid,
    org_id: Uuid,
    inviter_user_id: Uuid,
    email: String,
    role: String,
    token_hash: String,
    expiry_utc: DateTime<Utc>,
    used_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<InviteRow> for Invite {
    type Error = ServiceError;

    fn try_from(row: InviteRow) -> Result<Self, Self::Error> {
        Ok(Invite {
            invite_id: row.invite_id,
            org_id: row.org_id,
            inviter_user_id: row.inviter_user_id,
            email: row.email,
            role: parse_role(&row.role)?,
            token_hash: row.token_hash,
            expiry_utc: row.expiry_utc,
            used_utc: row.used_utc,
            created_utc: row.created_utc,
        })
    }
}

#[derive(FromRow)]
struct MembershipRow {
    org_id: Uuid,
    slug: String,
    display_name: String,
    role: String,
    created_utc: DateTime<Utc>,
}

#[derive(FromRow)]
struct RoleMappingRow {
    org_id: Uuid,
    provider: String,
    group_id: String,
    role: String,
}

const USER_COLUMNS: &str = "user_id, email, display_name, created_utc";
const ORG_COLUMNS: &str = "org_id, slug, display_name, tenant_id, created_utc";
const INVITE_COLUMNS: &str = "invite_id, org_id, inviter_user_id, email, role, token_hash, \
                              expiry_utc, used_utc, created_utc";
const CREDENTIAL_COLUMNS: &str = "user_id, username, password_hash, created_utc, updated_utc";
const TOTP_COLUMNS: &str =
    "user_id, secret, issuer, label, confirmed_utc, last_used_step, created_utc";

#[async_trait]
impl AuthRepository for Database {
    // ==================== User Operations ====================

    async fn upsert_user_by_email(&self, user: &User) -> Result<User, ServiceError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = format!(
            "INSERT INTO users (user_id, email, display_name, created_utc) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(user.user_id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.created_utc)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user_with_credential(
        &self,
        user: &User,
        credential: &LocalCredential,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO users (user_id, email, display_name, created_utc) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (email) DO NOTHING",
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.created_utc)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        sqlx::query(
            "INSERT INTO local_credentials (user_id, username, password_hash, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(credential.user_id)
        .bind(&credential.username)
        .bind(&credential.password_hash)
        .bind(credential.created_utc)
        .bind(credential.updated_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Identity Operations ====================

    async fn link_identity(&self, identity: &UserIdentity) -> Result<Uuid, ServiceError> {
        let bound: Uuid = sqlx::query_scalar(
            "INSERT INTO user_identities (provider, subject, user_id, created_utc) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (provider, subject) DO UPDATE SET provider = EXCLUDED.provider \
             RETURNING user_id",
        )
        .bind(&identity.provider)
        .bind(&identity.subject)
        .bind(identity.user_id)
        .bind(identity.created_utc)
        .fetch_one(&self.pool)
        .await?;
        Ok(bound)
    }

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<UserIdentity>, ServiceError> {
        Ok(sqlx::query_as::<_, UserIdentity>(
            "SELECT provider, subject, user_id, created_utc FROM user_identities \
             WHERE provider = $1 AND subject = $2",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ==================== Organization Operations ====================

    async fn create_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO organizations (org_id, slug, display_name, tenant_id, created_utc) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(org.org_id)
        .bind(&org.slug)
        .bind(&org.display_name)
        .bind(&org.tenant_id)
        .bind(org.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_organization_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        let sql = format!("SELECT {ORG_COLUMNS} FROM organizations WHERE slug = $1");
        Ok(sqlx::query_as::<_, Organization>(&sql)
            .bind(slug.to_lowercase())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_organization_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        let sql = format!("SELECT {ORG_COLUMNS} FROM organizations WHERE tenant_id = $1");
        Ok(sqlx::query_as::<_, Organization>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ==================== Membership Operations ====================

    async fn upsert_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
        reconcile: RoleReconcile,
    ) -> Result<OrgRole, ServiceError> {
        let sql = match reconcile {
            RoleReconcile::KeepExisting => {
                "INSERT INTO memberships (org_id, user_id, role, role_rank, created_utc, updated_utc) \
                 VALUES ($1, $2, $3, $4, NOW(), NOW()) \
                 ON CONFLICT (org_id, user_id) DO UPDATE SET org_id = memberships.org_id \
                 RETURNING role"
            }
            RoleReconcile::Elevate => {
                "INSERT INTO memberships (org_id, user_id, role, role_rank, created_utc, updated_utc) \
                 VALUES ($1, $2, $3, $4, NOW(), NOW()) \
                 ON CONFLICT (org_id, user_id) DO UPDATE \
                 SET role = CASE WHEN memberships.role_rank < EXCLUDED.role_rank \
                                 THEN EXCLUDED.role ELSE memberships.role END, \
                     role_rank = GREATEST(memberships.role_rank, EXCLUDED.role_rank), \
                     updated_utc = NOW() \
                 RETURNING role"
            }
        };

        let stored: String = sqlx::query_scalar(sql)
            .bind(org_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(role.rank())
            .fetch_one(&self.pool)
            .await?;
        parse_role(&stored)
    }

    async fn get_membership_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgRole>, ServiceError> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT role FROM memberships WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        stored.as_deref().map(parse_role).transpose()
    }

    async fn list_user_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, ServiceError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT o.org_id, o.slug, o.display_name, m.role, m.created_utc \
             FROM memberships m JOIN organizations o ON o.org_id = m.org_id \
             WHERE m.user_id = $1 \
             ORDER BY m.role_rank DESC, m.created_utc ASC, o.slug ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrgMembership {
                    role: parse_role(&row.role)?,
                    org_id: row.org_id,
                    slug: row.slug,
                    display_name: row.display_name,
                    created_utc: row.created_utc,
                })
            })
            .collect()
    }

    // ==================== Role Mapping Operations ====================

    async fn set_role_mapping(&self, mapping: &RoleMapping) -> Result<(), ServiceError> {
        if !mapping.role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        sqlx::query(
            "INSERT INTO role_mappings (org_id, provider, group_id, role) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (org_id, provider, group_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(mapping.org_id)
        .bind(&mapping.provider)
        .bind(&mapping.group_id)
        .bind(mapping.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_role_mappings(
        &self,
        org_id: Uuid,
        provider: &str,
        group_ids: &[String],
    ) -> Result<Vec<RoleMapping>, ServiceError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, RoleMappingRow>(
            "SELECT org_id, provider, group_id, role FROM role_mappings \
             WHERE org_id = $1 AND provider = $2 AND group_id = ANY($3)",
        )
        .bind(org_id)
        .bind(provider)
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RoleMapping {
                    role: parse_role(&row.role)?,
                    org_id: row.org_id,
                    provider: row.provider,
                    group_id: row.group_id,
                })
            })
            .collect()
    }

    // ==================== Invite Operations ====================

    async fn create_invite(&self, invite: &Invite) -> Result<(), ServiceError> {
        if !invite.role.is_grantable() {
            return Err(ServiceError::InvalidRole);
        }
        sqlx::query(
            "INSERT INTO invites (invite_id, org_id, inviter_user_id, email, role, token_hash, \
                                  expiry_utc, used_utc, created_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8)",
        )
        .bind(invite.invite_id)
        .bind(invite.org_id)
        .bind(invite.inviter_user_id)
        .bind(&invite.email)
        .bind(invite.role.as_str())
        .bind(&invite.token_hash)
        .bind(invite.expiry_utc)
        .bind(invite.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, ServiceError> {
        let sql = format!("SELECT {INVITE_COLUMNS} FROM invites WHERE token_hash = $1");
        sqlx::query_as::<_, InviteRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Invite::try_from)
            .transpose()
    }

    async fn redeem_invite(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RedeemedInvite>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(Uuid, String)> = sqlx::query_as(
            "UPDATE invites SET used_utc = $2 \
             WHERE invite_id = $1 AND used_utc IS NULL AND expiry_utc >= $2 \
             RETURNING org_id, role",
        )
        .bind(invite_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((org_id, role)) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };
        let role = parse_role(&role)?;

        let stored: String = sqlx::query_scalar(
            "INSERT INTO memberships (org_id, user_id, role, role_rank, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (org_id, user_id) DO UPDATE \
             SET role = CASE WHEN memberships.role_rank < EXCLUDED.role_rank \
                             THEN EXCLUDED.role ELSE memberships.role END, \
                 role_rank = GREATEST(memberships.role_rank, EXCLUDED.role_rank), \
                 updated_utc = EXCLUDED.updated_utc \
             RETURNING role",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(role.rank())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(RedeemedInvite {
            org_id,
            role: parse_role(&stored)?,
        }))
    }

    // ==================== Credential Operations ====================

    async fn find_credential_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalCredential>, ServiceError> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM local_credentials WHERE username = $1");
        Ok(sqlx::query_as::<_, LocalCredential>(&sql)
            .bind(normalize_email(username))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_credential_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LocalCredential>, ServiceError> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM local_credentials WHERE user_id = $1");
        Ok(sqlx::query_as::<_, LocalCredential>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn upsert_credential(&self, credential: &LocalCredential) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO local_credentials (user_id, username, password_hash, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE \
             SET username = EXCLUDED.username, \
                 password_hash = EXCLUDED.password_hash, \
                 updated_utc = EXCLUDED.updated_utc",
        )
        .bind(credential.user_id)
        .bind(&credential.username)
        .bind(&credential.password_hash)
        .bind(credential.created_utc)
        .bind(credential.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== TOTP Operations ====================

    async fn save_pending_totp(&self, secret: &TotpSecret) -> Result<bool, ServiceError> {
        let written = sqlx::query(
            "INSERT INTO totp_secrets (user_id, secret, issuer, label, confirmed_utc, last_used_step, created_utc) \
             VALUES ($1, $2, $3, $4, NULL, NULL, $5) \
             ON CONFLICT (user_id) DO UPDATE \
             SET secret = EXCLUDED.secret, issuer = EXCLUDED.issuer, label = EXCLUDED.label, \
                 last_used_step = NULL, created_utc = EXCLUDED.created_utc \
             WHERE totp_secrets.confirmed_utc IS NULL",
        )
        .bind(secret.user_id)
        .bind(&secret.secret)
        .bind(&secret.issuer)
        .bind(&secret.label)
        .bind(secret.created_utc)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(written == 1)
    }

    async fn find_totp_secret(&self, user_id: Uuid) -> Result<Option<TotpSecret>, ServiceError> {
        let sql = format!("SELECT {TOTP_COLUMNS} FROM totp_secrets WHERE user_id = $1");
        Ok(sqlx::query_as::<_, TotpSecret>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn confirm_totp(
        &self,
        user_id: Uuid,
        secret: &str,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let updated = sqlx::query(
            "UPDATE totp_secrets SET confirmed_utc = $4, last_used_step = $3 \
             WHERE user_id = $1 AND secret = $2 AND confirmed_utc IS NULL",
        )
        .bind(user_id)
        .bind(secret)
        .bind(step)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn consume_totp_step(&self, user_id: Uuid, step: i64) -> Result<bool, ServiceError> {
        let updated = sqlx::query(
            "UPDATE totp_secrets SET last_used_step = $2 \
             WHERE user_id = $1 AND (last_used_step IS NULL OR last_used_step < $2)",
        )
        .bind(user_id)
        .bind(step)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

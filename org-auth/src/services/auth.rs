//! Local and external sign-in flows built on the resolvers and session store.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{
    AuthRepository, IdentityResolver, OrgRoleResolver, ServiceError, SessionStore,
    VerifiedIdentity,
};
use crate::models::{LocalCredential, OrgRole, Session, SessionHandle, TotpSecret, User};
use crate::utils::{
    check_password_policy, hash_password, needs_rehash, totp, verify_password, Password,
    PasswordHashString, PasswordParams,
};

/// Provider name recorded on sessions created from a password login.
pub const LOCAL_PROVIDER: &str = "local";

/// Tunables of the authentication flows.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub password_params: PasswordParams,
    pub session_ttl: Duration,
    pub totp_issuer: String,
    pub default_signin_role: OrgRole,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            password_params: PasswordParams::default(),
            session_ttl: Duration::hours(8),
            totp_issuer: "Work Orders".to_string(),
            default_signin_role: OrgRole::Member,
        }
    }
}

/// A user with a freshly created session.
#[derive(Debug)]
pub struct SignedIn {
    pub user: User,
    pub session: Session,
    pub handle: SessionHandle,
}

/// Pending TOTP enrollment returned to the user once.
pub struct TotpSetup {
    pub secret: String,
    pub otpauth_url: String,
    pub issuer: String,
    pub label: String,
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn AuthRepository>,
    sessions: Arc<dyn SessionStore>,
    identity: IdentityResolver,
    orgs: OrgRoleResolver,
    settings: AuthSettings,
    // Verified against when the username is unknown so misses cost one Argon2 run.
    dummy_hash: Arc<OnceCell<PasswordHashString>>,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn AuthRepository>,
        sessions: Arc<dyn SessionStore>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(repo.clone()),
            orgs: OrgRoleResolver::new(repo.clone()),
            repo,
            sessions,
            settings,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    async fn start_session(
        &self,
        user: User,
        active_org_id: Option<uuid::Uuid>,
        provider: &str,
    ) -> Result<SignedIn, ServiceError> {
        let session = Session::new(
            user.user_id,
            active_org_id,
            provider,
            self.settings.session_ttl,
        );
        let handle = self.sessions.create(&session).await?;
        Ok(SignedIn {
            user,
            session,
            handle,
        })
    }

    /// Create a user with a local credential and sign it in.
    #[tracing::instrument(skip_all)]
    pub async fn signup(
        &self,
        email: &str,
        password: &Password,
        name: &str,
    ) -> Result<SignedIn, ServiceError> {
        check_password_policy(password)?;

        let user = User::new(email, name);
        let hash = hash_password(password, &self.settings.password_params)?;
        let credential = LocalCredential::new(user.user_id, &user.email, hash.into_string());

        self.repo
            .create_user_with_credential(&user, &credential)
            .await?;
        tracing::info!(user_id = %user.user_id, "User signed up");

        self.start_session(user, None, LOCAL_PROVIDER).await
    }

    /// Password login, with a TOTP code when the user has a confirmed enrollment.
    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        totp_code: Option<&str>,
    ) -> Result<SignedIn, ServiceError> {
        let Some(credential) = self.repo.find_credential_by_username(email).await? else {
            self.burn_verification(password).await?;
            return Err(ServiceError::InvalidCredentials);
        };

        let stored = PasswordHashString::new(credential.password_hash.clone());
        if !verify_password(password, &stored)? {
            tracing::info!(user_id = %credential.user_id, "Password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }

        let user = self
            .repo
            .find_user_by_id(credential.user_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if let Some(enrollment) = self.repo.find_totp_secret(user.user_id).await? {
            if enrollment.is_confirmed() {
                let code = totp_code.ok_or(ServiceError::SecondFactorRequired)?;
                self.check_second_factor(&enrollment, code).await?;
            }
        }

        if needs_rehash(&stored, &self.settings.password_params) {
            self.rehash(&credential, password).await;
        }

        let active_org = self.orgs.pick_active_org(user.user_id).await?;
        tracing::info!(user_id = %user.user_id, "User logged in");
        self.start_session(user, active_org, LOCAL_PROVIDER).await
    }

    async fn burn_verification(&self, password: &Password) -> Result<(), ServiceError> {
        let params = &self.settings.password_params;
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| async move {
                hash_password(&Password::new(crate::utils::generate_secure_token()), params)
            })
            .await?;
        verify_password(password, dummy)?;
        Ok(())
    }

    async fn check_second_factor(
        &self,
        enrollment: &TotpSecret,
        code: &str,
    ) -> Result<(), ServiceError> {
        let step = totp::verify_code(&enrollment.secret, code, Utc::now().timestamp())
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !self.repo.consume_totp_step(enrollment.user_id, step).await? {
            tracing::warn!(user_id = %enrollment.user_id, "Rejected replayed TOTP code");
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(())
    }

    // Upgrading the stored hash is best effort; the login already succeeded.
    async fn rehash(&self, credential: &LocalCredential, password: &Password) {
        let result = match hash_password(password, &self.settings.password_params) {
            Ok(hash) => {
                let mut upgraded = credential.clone();
                upgraded.password_hash = hash.into_string();
                upgraded.updated_utc = Utc::now();
                self.repo.upsert_credential(&upgraded).await
            }
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => tracing::info!(user_id = %credential.user_id, "Upgraded password hash"),
            Err(e) => {
                tracing::warn!(user_id = %credential.user_id, error = %e, "Password rehash failed")
            }
        }
    }

    pub async fn logout(&self, handle: &SessionHandle) -> Result<(), ServiceError> {
        self.sessions.invalidate(handle).await
    }

    /// Create or replace the local credential of `user`.
    pub async fn set_password(&self, user: &User, password: &Password) -> Result<(), ServiceError> {
        check_password_policy(password)?;
        let hash = hash_password(password, &self.settings.password_params)?;
        self.repo
            .upsert_credential(&LocalCredential::new(
                user.user_id,
                &user.email,
                hash.into_string(),
            ))
            .await?;
        tracing::info!(user_id = %user.user_id, "Password set");
        Ok(())
    }

    /// Replace the session with one bound to the organization `slug`.
    pub async fn switch_organization(
        &self,
        user: &User,
        current_handle: &SessionHandle,
        current: &Session,
        slug: &str,
    ) -> Result<SignedIn, ServiceError> {
        let org = self
            .repo
            .find_organization_by_slug(slug)
            .await?
            .ok_or(ServiceError::Forbidden)?;
        if self.orgs.get_role(org.org_id, user.user_id).await?.is_none() {
            return Err(ServiceError::Forbidden);
        }

        let signed_in = self
            .start_session(user.clone(), Some(org.org_id), &current.provider)
            .await?;
        self.sessions.invalidate(current_handle).await?;
        tracing::info!(user_id = %user.user_id, org_id = %org.org_id, "Switched organization");
        Ok(signed_in)
    }

    /// Start (or restart) TOTP enrollment. Refused once an enrollment is confirmed.
    pub async fn begin_totp_setup(&self, user: &User) -> Result<TotpSetup, ServiceError> {
        let secret = totp::generate_secret();
        let issuer = self.settings.totp_issuer.clone();
        let pending = TotpSecret::new(user.user_id, secret.clone(), &issuer, &user.email);

        if !self.repo.save_pending_totp(&pending).await? {
            return Err(ServiceError::TotpAlreadyEnrolled);
        }

        Ok(TotpSetup {
            otpauth_url: totp::provisioning_uri(&secret, &issuer, &user.email),
            secret,
            issuer,
            label: user.email.clone(),
        })
    }

    pub async fn confirm_totp_setup(&self, user: &User, code: &str) -> Result<(), ServiceError> {
        let pending = self
            .repo
            .find_totp_secret(user.user_id)
            .await?
            .ok_or(ServiceError::TotpNotEnrolled)?;
        if pending.is_confirmed() {
            return Err(ServiceError::TotpAlreadyEnrolled);
        }

        let now = Utc::now();
        let step = totp::verify_code(&pending.secret, code, now.timestamp())
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?
            .ok_or(ServiceError::InvalidTotpCode)?;

        if !self
            .repo
            .confirm_totp(user.user_id, &pending.secret, step, now)
            .await?
        {
            return Err(ServiceError::InvalidTotpCode);
        }
        tracing::info!(user_id = %user.user_id, "TOTP enrollment confirmed");
        Ok(())
    }

    /// Complete an external sign-in for an identity the provider verified.
    #[tracing::instrument(skip_all, fields(provider = %provider))]
    pub async fn sign_in_external(
        &self,
        provider: &str,
        identity: VerifiedIdentity,
    ) -> Result<SignedIn, ServiceError> {
        if !identity.email_verified {
            return Err(ServiceError::EmailNotVerified);
        }

        let user = match self
            .identity
            .find_linked_user(provider, &identity.subject)
            .await?
        {
            Some(user) => user,
            None => {
                let user = self
                    .identity
                    .upsert_user_by_verified_email(
                        &identity.email,
                        identity.name.as_deref().unwrap_or_default(),
                    )
                    .await?;
                self.identity
                    .link_identity(user.user_id, provider, &identity.subject)
                    .await?;
                user
            }
        };

        let tenant_org = match identity.tenant_id.as_deref() {
            Some(tenant) => self.repo.find_organization_by_tenant(tenant).await?,
            None => None,
        };

        let active_org = match tenant_org {
            Some(org) => {
                let role = self
                    .orgs
                    .resolve_sign_in_role(
                        org.org_id,
                        user.user_id,
                        provider,
                        &identity.groups,
                        self.settings.default_signin_role,
                    )
                    .await?;
                tracing::info!(
                    user_id = %user.user_id,
                    org_id = %org.org_id,
                    role = %role,
                    "Bound tenant organization"
                );
                Some(org.org_id)
            }
            None => self.orgs.pick_active_org(user.user_id).await?,
        };

        self.start_session(user, active_org, provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Organization;
    use crate::services::{InMemoryRepository, MemorySessionStore};

    fn fast_settings() -> AuthSettings {
        AuthSettings {
            password_params: PasswordParams {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
                salt_len: 16,
                key_len: 32,
            },
            ..AuthSettings::default()
        }
    }

    fn service() -> (AuthService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let sessions = Arc::new(MemorySessionStore::new());
        (
            AuthService::new(repo.clone(), sessions, fast_settings()),
            repo,
        )
    }

    fn pw(s: &str) -> Password {
        Password::new(s.to_string())
    }

    #[tokio::test]
    async fn test_unknown_user_login_still_runs_argon2() {
        let (svc, _) = service();
        assert!(svc.dummy_hash.get().is_none());

        let err = svc.login("nobody@x.com", &pw("longenough1"), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let dummy = svc.dummy_hash.get().expect("dummy hash initialised");
        assert!(dummy.as_str().starts_with("$argon2id$"));
        assert!(dummy.as_str().contains("m=1024,t=1,p=1"));
    }

    fn identity(subject: &str, email: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: Some("Someone".to_string()),
            groups: Vec::new(),
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn test_signup_then_duplicate() {
        let (svc, repo) = service();
        let first = svc.signup("a@x.com", &pw("longenough1"), "A").await.unwrap();
        assert_eq!(first.session.active_org_id, None);
        assert!(repo
            .find_credential_by_user(first.user.user_id)
            .await
            .unwrap()
            .is_some());

        let err = svc.signup("A@x.com", &pw("different1"), "").await.unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn test_signup_rejects_short_password() {
        let (svc, _) = service();
        let err = svc.signup("a@x.com", &pw("short"), "").await.unwrap_err();
        assert!(matches!(err, ServiceError::WeakPassword));
    }

    #[tokio::test]
    async fn test_login_picks_highest_role_org() {
        let (svc, repo) = service();
        let signed_up = svc.signup("a@x.com", &pw("longenough1"), "").await.unwrap();
        let low = Organization::new("low", "Low", None);
        let high = Organization::new("high", "High", None);
        repo.create_organization(&low).await.unwrap();
        repo.create_organization(&high).await.unwrap();
        let user_id = signed_up.user.user_id;
        svc.orgs.ensure_membership(low.org_id, user_id, OrgRole::Viewer).await.unwrap();
        svc.orgs.ensure_membership(high.org_id, user_id, OrgRole::Admin).await.unwrap();

        let signed_in = svc.login("A@X.com", &pw("longenough1"), None).await.unwrap();
        assert_eq!(signed_in.session.active_org_id, Some(high.org_id));
        assert_eq!(signed_in.session.provider, LOCAL_PROVIDER);

        let err = svc.login("a@x.com", &pw("wrong-password"), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_rehashes_outdated_parameters() {
        let (svc, repo) = service();
        let old_params = PasswordParams {
            memory_kib: 512,
            ..fast_settings().password_params
        };
        let user = User::new("old@x.com", "");
        let old_hash = hash_password(&pw("longenough1"), &old_params).unwrap();
        repo.create_user_with_credential(
            &user,
            &LocalCredential::new(user.user_id, &user.email, old_hash.clone().into_string()),
        )
        .await
        .unwrap();

        svc.login("old@x.com", &pw("longenough1"), None).await.unwrap();

        let stored = repo.find_credential_by_user(user.user_id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, old_hash.as_str());
        assert!(stored.password_hash.contains("m=1024"));
    }

    #[tokio::test]
    async fn test_totp_enrollment_and_login_requirement() {
        let (svc, _) = service();
        let signed_up = svc.signup("t@x.com", &pw("longenough1"), "").await.unwrap();
        let setup = svc.begin_totp_setup(&signed_up.user).await.unwrap();
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));

        let key = totp::base32_decode(&setup.secret).unwrap();
        let now = Utc::now().timestamp();
        let code = |step: i64| format!("{:06}", totp::hotp(&key, step as u64, 6).unwrap());

        assert!(matches!(
            svc.confirm_totp_setup(&signed_up.user, "000000x").await,
            Err(ServiceError::InvalidTotpCode)
        ));
        svc.confirm_totp_setup(&signed_up.user, &code(totp::time_step(now)))
            .await
            .unwrap();
        assert!(matches!(
            svc.begin_totp_setup(&signed_up.user).await,
            Err(ServiceError::TotpAlreadyEnrolled)
        ));

        let err = svc.login("t@x.com", &pw("longenough1"), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::SecondFactorRequired));

        // The confirmation code's step is already consumed.
        let err = svc
            .login("t@x.com", &pw("longenough1"), Some(&code(totp::time_step(now))))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let next = code(totp::time_step(now) + 1);
        svc.login("t@x.com", &pw("longenough1"), Some(&next)).await.unwrap();
        let err = svc
            .login("t@x.com", &pw("longenough1"), Some(&next))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_external_sign_in_links_once_and_binds_tenant() {
        let (svc, repo) = service();
        let org = Organization::new("acme", "Acme", Some("tenant-1".to_string()));
        repo.create_organization(&org).await.unwrap();
        svc.orgs
            .set_group_role_mapping(org.org_id, "corp", "G2", OrgRole::Admin)
            .await
            .unwrap();

        let mut id = identity("sub-1", "E@x.com");
        id.tenant_id = Some("tenant-1".to_string());
        id.groups = vec!["G1".to_string(), "G2".to_string()];

        let first = svc.sign_in_external("corp", id.clone()).await.unwrap();
        assert_eq!(first.session.active_org_id, Some(org.org_id));
        assert_eq!(
            repo.get_membership_role(org.org_id, first.user.user_id).await.unwrap(),
            Some(OrgRole::Admin)
        );

        // Same subject resolves to the same user even if the email changed upstream.
        let second = svc
            .sign_in_external("corp", identity("sub-1", "renamed@x.com"))
            .await
            .unwrap();
        assert_eq!(second.user.user_id, first.user.user_id);
    }

    #[tokio::test]
    async fn test_external_sign_in_refuses_rebinding_subject() {
        let (svc, _) = service();
        svc.sign_in_external("corp", identity("sub-1", "a@x.com")).await.unwrap();
        svc.signup("b@x.com", &pw("longenough1"), "").await.unwrap();

        // A different subject claiming an existing user's email links to that user,
        // but the original subject stays bound where it was.
        let b = svc.sign_in_external("corp", identity("sub-2", "b@x.com")).await.unwrap();
        let err = svc
            .identity
            .link_identity(b.user.user_id, "corp", "sub-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IdentityConflict));
    }

    #[tokio::test]
    async fn test_external_sign_in_requires_verified_email() {
        let (svc, _) = service();
        let mut id = identity("sub-1", "a@x.com");
        id.email_verified = false;
        assert!(matches!(
            svc.sign_in_external("corp", id).await,
            Err(ServiceError::EmailNotVerified)
        ));
    }
}

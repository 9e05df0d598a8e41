//! Identity resolution: verified email -> user, provider subject -> user.

use std::sync::Arc;
use uuid::Uuid;

use super::{AuthRepository, ServiceError};
use crate::models::{user::normalize_email, User, UserIdentity};

#[derive(Clone)]
pub struct IdentityResolver {
    repo: Arc<dyn AuthRepository>,
}

impl IdentityResolver {
    pub fn new(repo: Arc<dyn AuthRepository>) -> Self {
        Self { repo }
    }

    /// Find the user owning `email`, creating it if absent.
    ///
    /// The caller must already have verified the email. Creation is a single
    /// insert-if-absent at the storage boundary, so concurrent first logins
    /// converge on one user.
    pub async fn upsert_user_by_verified_email(
        &self,
        email: &str,
        name: &str,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation("invalid email".to_string()));
        }

        let user = self.repo.upsert_user_by_email(&User::new(&email, name)).await?;
        tracing::debug!(user_id = %user.user_id, "Resolved user by verified email");
        Ok(user)
    }

    /// Bind (provider, subject) to `user_id`.
    ///
    /// Re-linking to the same user is a no-op; a subject already bound to a
    /// different user is a conflict and is never re-bound.
    pub async fn link_identity(
        &self,
        user_id: Uuid,
        provider: &str,
        subject: &str,
    ) -> Result<(), ServiceError> {
        let bound = self
            .repo
            .link_identity(&UserIdentity::new(user_id, provider, subject))
            .await?;

        if bound != user_id {
            tracing::warn!(
                provider = %provider,
                user_id = %user_id,
                "Refused to re-bind provider subject to a different user"
            );
            return Err(ServiceError::IdentityConflict);
        }
        Ok(())
    }

    /// User previously linked to (provider, subject), if any.
    pub async fn find_linked_user(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, ServiceError> {
        match self.repo.find_identity(provider, subject).await? {
            Some(identity) => self.repo.find_user_by_id(identity.user_id).await,
            None => Ok(None),
        }
    }
}

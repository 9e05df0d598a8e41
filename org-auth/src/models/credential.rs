use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::normalize_email;

/// Local password credential. At most one per user, replaced in place.
#[derive(Clone, FromRow)]
pub struct LocalCredential {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LocalCredential {
    pub fn new(user_id: Uuid, email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: normalize_email(email),
            password_hash,
            created_utc: now,
            updated_utc: now,
        }
    }
}

impl std::fmt::Debug for LocalCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredential")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

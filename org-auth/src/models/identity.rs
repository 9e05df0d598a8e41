use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Binding of an external provider subject to a user. (provider, subject) is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserIdentity {
    pub provider: String,
    pub subject: String,
    pub user_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl UserIdentity {
    pub fn new(user_id: Uuid, provider: &str, subject: &str) -> Self {
        Self {
            provider: provider.to_string(),
            subject: subject.to_string(),
            user_id,
            created_utc: Utc::now(),
        }
    }
}

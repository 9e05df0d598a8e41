use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// TOTP enrollment for a user. The secret is the base32 shared key.
#[derive(Clone, FromRow)]
pub struct TotpSecret {
    pub user_id: Uuid,
    pub secret: String,
    pub issuer: String,
    pub label: String,
    pub confirmed_utc: Option<DateTime<Utc>>,
    /// Last time step accepted for this user; codes at or below it are replays.
    pub last_used_step: Option<i64>,
    pub created_utc: DateTime<Utc>,
}

impl TotpSecret {
    pub fn new(user_id: Uuid, secret: String, issuer: &str, label: &str) -> Self {
        Self {
            user_id,
            secret,
            issuer: issuer.to_string(),
            label: label.to_string(),
            confirmed_utc: None,
            last_used_step: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_utc.is_some()
    }
}

impl std::fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpSecret")
            .field("user_id", &self.user_id)
            .field("issuer", &self.issuer)
            .field("label", &self.label)
            .field("confirmed_utc", &self.confirmed_utc)
            .finish_non_exhaustive()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity-independent principal. Email is stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, display_name: &str) -> Self {
        let email = normalize_email(email);
        let display_name = match display_name.trim() {
            "" => email.clone(),
            name => name.to_string(),
        };

        Self {
            user_id: Uuid::new_v4(),
            email,
            display_name,
            created_utc: Utc::now(),
        }
    }

    pub fn email_matches(&self, other: &str) -> bool {
        self.email == normalize_email(other)
    }
}

/// Canonical form used for every email comparison and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

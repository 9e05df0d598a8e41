use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub org_id: Uuid,
    pub slug: String,
    pub display_name: String,
    /// External IdP tenant this organization is bound to, if any.
    pub tenant_id: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(slug: &str, display_name: &str, tenant_id: Option<String>) -> Self {
        Self {
            org_id: Uuid::new_v4(),
            slug: slug.trim().to_lowercase(),
            display_name: display_name.to_string(),
            tenant_id,
            created_utc: Utc::now(),
        }
    }
}

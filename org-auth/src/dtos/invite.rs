use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::OrgRole;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(email)]
    pub email: String,
    /// Role name, case-insensitive. Owner is refused; omitted means Member.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInviteResponse {
    pub ok: bool,
    pub accept_url: String,
    pub exp: DateTime<Utc>,
    pub role: OrgRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInviteRequest {
    #[validate(length(min = 1, max = 256))]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptInviteResponse {
    pub ok: bool,
    pub org_id: Uuid,
    pub role: OrgRole,
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{OrgMembership, OrgRole};

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RedirectQuery {
    pub redirect: Option<String>,
    pub navigate: Option<String>,
}

impl RedirectQuery {
    pub fn requested(&self) -> bool {
        [&self.redirect, &self.navigate]
            .into_iter()
            .flatten()
            .any(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SwitchOrgRequest {
    #[validate(length(min = 1, max = 100))]
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub ok: bool,
    pub user_id: Uuid,
    pub active_org_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetPasswordResponse {
    pub ok: bool,
    pub redirect: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub active_org_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrgSummary {
    pub org_id: Uuid,
    pub slug: String,
    pub name: String,
    pub role: OrgRole,
    pub active: bool,
}

impl OrgSummary {
    pub fn from_membership(m: OrgMembership, active_org_id: Option<Uuid>) -> Self {
        Self {
            active: Some(m.org_id) == active_org_id,
            org_id: m.org_id,
            slug: m.slug,
            name: m.display_name,
            role: m.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::OrgRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct OrgContextResponse {
    pub org_id: Uuid,
    pub slug: String,
    pub name: String,
    pub role: OrgRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetRoleMappingRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 256))]
    pub group_id: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleMappingResponse {
    pub ok: bool,
    pub provider: String,
    pub group_id: String,
    pub role: OrgRole,
}

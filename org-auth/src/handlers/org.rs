use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::org::{OrgContextResponse, RoleMappingResponse, SetRoleMappingRequest};
use crate::middleware::OrgContext;
use crate::services::InviteManager;
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /orgs/:slug/context
pub async fn context(org: OrgContext) -> Json<OrgContextResponse> {
    Json(OrgContextResponse {
        org_id: org.org.org_id,
        slug: org.org.slug,
        name: org.org.display_name,
        role: org.role,
    })
}

/// PUT /orgs/:slug/role-mappings
///
/// Map an IdP group to a role in this organization. Owner is never a valid
/// target.
pub async fn set_role_mapping(
    State(state): State<AppState>,
    org: OrgContext,
    ValidatedJson(req): ValidatedJson<SetRoleMappingRequest>,
) -> Result<Json<RoleMappingResponse>, AppError> {
    let role = InviteManager::parse_grantable_role(&req.role)?;
    let provider = req.provider.to_lowercase();

    state
        .orgs
        .set_group_role_mapping(org.org.org_id, &provider, &req.group_id, role)
        .await?;
    tracing::info!(
        org_id = %org.org.org_id,
        provider = %provider,
        group_id = %req.group_id,
        role = %role,
        "Group role mapping saved"
    );

    Ok(Json(RoleMappingResponse {
        ok: true,
        provider,
        group_id: req.group_id,
        role,
    }))
}

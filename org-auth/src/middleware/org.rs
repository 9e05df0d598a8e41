//! Organization context for `/orgs/:slug/...` routes.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use super::RequestContext;
use crate::models::{Organization, OrgRole};
use crate::AppState;

/// Organization named by the path together with the caller's role in it.
#[derive(Debug, Clone)]
pub struct OrgContext {
    pub org: Organization,
    pub role: OrgRole,
}

/// Resolve the `:slug` path segment against the session.
///
/// The organization must exist, be the session's active organization and
/// hold a membership for the caller; anything else is a generic 403.
/// Must run after [`super::require_session`].
pub async fn org_context_middleware(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(AppError::unauthorized)?;

    let org = state
        .repo
        .find_organization_by_slug(&slug.to_lowercase())
        .await?
        .ok_or_else(AppError::forbidden)?;

    if ctx.session.active_org_id != Some(org.org_id) {
        tracing::info!(
            user_id = %ctx.user.user_id,
            org_id = %org.org_id,
            "Request for an organization other than the active one"
        );
        return Err(AppError::forbidden());
    }

    let role = state
        .orgs
        .get_role(org.org_id, ctx.user.user_id)
        .await?
        .ok_or_else(AppError::forbidden)?;

    req.extensions_mut().insert(OrgContext { org, role });
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for OrgContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OrgContext>()
            .cloned()
            .ok_or_else(AppError::forbidden)
    }
}

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use super::{OrgContext, RequestContext};
use crate::models::OrgRole;

/// Reject callers whose role in the bound organization is below `minimum`.
///
/// Must run after [`super::org_context_middleware`]. The response never names
/// the required role.
pub async fn require_role(
    State(minimum): State<OrgRole>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let org = req
        .extensions()
        .get::<OrgContext>()
        .ok_or_else(AppError::forbidden)?;

    if !org.role.satisfies(minimum) {
        let user_id = req.extensions().get::<RequestContext>().map(|c| c.user.user_id);
        tracing::warn!(
            user_id = ?user_id,
            org_id = %org.org.org_id,
            role = %org.role,
            required = %minimum,
            "Insufficient role"
        );
        return Err(AppError::forbidden());
    }

    Ok(next.run(req).await)
}

//! Invite issuance (org admins) and redemption (any signed-in user).

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::dtos::invite::{
    AcceptInviteQuery, AcceptInviteRequest, AcceptInviteResponse, CreateInviteRequest,
    CreateInviteResponse,
};
use crate::middleware::{session_cookie, OrgContext, RequestContext};
use crate::models::OrgRole;
use crate::services::{InviteManager, ServiceError};
use crate::utils::{request::external_origin, ValidatedJson};
use crate::AppState;

/// POST /orgs/:slug/invites
#[tracing::instrument(skip_all, fields(org_id = %org.org.org_id))]
pub async fn create_invite(
    State(state): State<AppState>,
    ctx: RequestContext,
    org: OrgContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<CreateInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = match req.role.as_deref() {
        Some(raw) => InviteManager::parse_grantable_role(raw)?,
        None => OrgRole::Member,
    };
    let issued = state
        .invites
        .issue_invite(org.org.org_id, ctx.user.user_id, &req.email, role)
        .await?;

    let accept_url = format!(
        "{}/invite/accept?token={}",
        external_origin(&headers),
        urlencoding::encode(&issued.token)
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            ok: true,
            accept_url,
            exp: issued.invite.expiry_utc,
            role: issued.invite.role,
        }),
    ))
}

/// POST /auth/invite/accept
pub async fn accept_invite(
    State(state): State<AppState>,
    jar: CookieJar,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<AcceptInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accepted = state
        .invites
        .accept_invite(&req.token, &ctx.user, &ctx.handle, &ctx.session)
        .await?;

    let jar = jar.add(session_cookie(
        &accepted.handle,
        &accepted.session,
        state.config.session.cookie_secure,
    ));
    Ok((
        jar,
        Json(AcceptInviteResponse {
            ok: true,
            org_id: accepted.org_id,
            role: accepted.role,
        }),
    ))
}

/// GET /invite/accept?token=...
///
/// Link target from the invite email; lands on the frontend once accepted.
pub async fn accept_invite_link(
    State(state): State<AppState>,
    jar: CookieJar,
    ctx: RequestContext,
    Query(query): Query<AcceptInviteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = query.token.ok_or(ServiceError::InvalidInvite)?;
    let accepted = state
        .invites
        .accept_invite(&token, &ctx.user, &ctx.handle, &ctx.session)
        .await?;

    let jar = jar.add(session_cookie(
        &accepted.handle,
        &accepted.session,
        state.config.session.cookie_secure,
    ));
    Ok((jar, Redirect::to(&state.config.post_login_url())))
}

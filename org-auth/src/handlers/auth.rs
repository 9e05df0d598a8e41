//! Local account handlers: signup, login, logout, password and profile.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::with_session;
use crate::dtos::auth::{
    LoginRequest, OrgSummary, ProfileResponse, RedirectQuery, SetPasswordRequest,
    SetPasswordResponse, SignupRequest, SwitchOrgRequest,
};
use crate::dtos::OkResponse;
use crate::middleware::{clear_session_cookie, RequestContext};
use crate::utils::{request::wants_redirect, Password, ValidatedJson};
use crate::AppState;

/// POST /auth/signup
#[tracing::instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let signed_in = state.auth.signup(&req.email, &password, &req.name).await?;

    let (jar, body) = with_session(&state, jar, &signed_in.handle, &signed_in.session);
    Ok((StatusCode::CREATED, jar, body))
}

/// POST /auth/login
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);
    let signed_in = state
        .auth
        .login(&req.email, &password, req.totp_code.as_deref())
        .await?;

    Ok(with_session(&state, jar, &signed_in.handle, &signed_in.session))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    ctx: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&ctx.handle).await?;
    tracing::info!(user_id = %ctx.user.user_id, "User logged out");
    Ok((clear_session_cookie(jar), Json(OkResponse::ok())))
}

/// POST /auth/set-password
///
/// Browser navigations are sent on to the post-login page; API callers get
/// the target URL in the body.
pub async fn set_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: HeaderMap,
    Query(query): Query<RedirectQuery>,
    ValidatedJson(req): ValidatedJson<SetPasswordRequest>,
) -> Result<Response, AppError> {
    state
        .auth
        .set_password(&ctx.user, &Password::new(req.password))
        .await?;

    let target = state.config.post_login_url();
    if wants_redirect(&headers, query.requested()) {
        return Ok(Redirect::to(&target).into_response());
    }
    Ok(Json(SetPasswordResponse {
        ok: true,
        redirect: target,
    })
    .into_response())
}

/// GET /auth/me
pub async fn me(ctx: RequestContext) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user_id: ctx.user.user_id,
        email: ctx.user.email,
        name: ctx.user.display_name,
        provider: ctx.session.provider,
        active_org_id: ctx.session.active_org_id,
    })
}

/// GET /auth/orgs
pub async fn list_organizations(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<OrgSummary>>, AppError> {
    let memberships = state.orgs.list_memberships(ctx.user.user_id).await?;
    Ok(Json(
        memberships
            .into_iter()
            .map(|m| OrgSummary::from_membership(m, ctx.session.active_org_id))
            .collect(),
    ))
}

/// POST /auth/switch-org
pub async fn switch_organization(
    State(state): State<AppState>,
    jar: CookieJar,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<SwitchOrgRequest>,
) -> Result<impl IntoResponse, AppError> {
    let signed_in = state
        .auth
        .switch_organization(&ctx.user, &ctx.handle, &ctx.session, &req.slug.to_lowercase())
        .await?;

    Ok(with_session(&state, jar, &signed_in.handle, &signed_in.session))
}

use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::totp::{TotpSetupResponse, TotpVerifyRequest};
use crate::dtos::OkResponse;
use crate::middleware::RequestContext;
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /auth/mfa/totp/setup
///
/// Returns the shared secret once; calling again before confirmation
/// replaces the pending secret.
pub async fn setup(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<TotpSetupResponse>, AppError> {
    let setup = state.auth.begin_totp_setup(&ctx.user).await?;
    tracing::info!(user_id = %ctx.user.user_id, "TOTP enrollment started");

    Ok(Json(TotpSetupResponse {
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
        issuer: setup.issuer,
        label: setup.label,
    }))
}

/// POST /auth/mfa/totp/verify
pub async fn verify(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<TotpVerifyRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state.auth.confirm_totp_setup(&ctx.user, &req.code).await?;
    Ok(Json(OkResponse::ok()))
}

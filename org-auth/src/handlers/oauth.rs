//! External sign-in through a configured identity provider.
//!
//! Authorization-code flow with PKCE. The state value and code verifier live
//! in short-lived HTTP-only cookies scoped to `/auth`.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::dtos::auth::OAuthCallbackQuery;
use crate::middleware::session_cookie;
use crate::services::ServiceError;
use crate::utils::{generate_secure_token, pkce_challenge};
use crate::AppState;

pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_VERIFIER_COOKIE: &str = "oauth_verifier";
const OAUTH_COOKIE_PATH: &str = "/auth";
const OAUTH_COOKIE_MINUTES: i64 = 5;

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(OAUTH_COOKIE_PATH)
        .max_age(time::Duration::minutes(OAUTH_COOKIE_MINUTES))
        .build()
}

fn clear_flow_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path(OAUTH_COOKIE_PATH))
        .remove(Cookie::build(OAUTH_VERIFIER_COOKIE).path(OAUTH_COOKIE_PATH))
}

/// GET /auth/:provider
pub async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let provider = state.providers.get(&provider)?;

    let oauth_state = generate_secure_token();
    let verifier = generate_secure_token();
    let url = provider.authorize_url(&oauth_state, &pkce_challenge(&verifier));

    let secure = state.config.session.cookie_secure;
    let jar = jar
        .add(flow_cookie(OAUTH_STATE_COOKIE, oauth_state, secure))
        .add(flow_cookie(OAUTH_VERIFIER_COOKIE, verifier, secure));

    tracing::debug!(provider = %provider.name(), "Redirecting to identity provider");
    Ok((jar, Redirect::to(&url)))
}

/// GET /auth/:provider/callback
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let provider = state.providers.get(&provider)?;

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(error = %error, "Identity provider returned an error");
        return Err(ServiceError::Unauthenticated.into());
    }

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let verifier = jar.get(OAUTH_VERIFIER_COOKIE).map(|c| c.value().to_string());
    let jar = clear_flow_cookies(jar);

    let (Some(expected), Some(returned), Some(verifier), Some(code)) =
        (expected, query.state, verifier, query.code)
    else {
        return Err(ServiceError::InvalidOAuthState.into());
    };

    if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(returned.as_bytes())) {
        tracing::warn!("OAuth state mismatch");
        return Err(ServiceError::InvalidOAuthState.into());
    }

    let identity = provider.exchange(&code, &verifier).await?;
    let signed_in = state
        .auth
        .sign_in_external(provider.name(), identity)
        .await?;

    let jar = jar.add(session_cookie(
        &signed_in.handle,
        &signed_in.session,
        state.config.session.cookie_secure,
    ));
    tracing::info!(user_id = %signed_in.user.user_id, "External sign-in completed");

    Ok((jar, Redirect::to(&state.config.post_login_url())))
}

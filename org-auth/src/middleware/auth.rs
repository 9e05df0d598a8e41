//! Session authentication for browser requests.
//!
//! The `session` cookie carries an opaque handle. Every failure mode (no
//! cookie, unknown handle, expired session, deleted user) is reported as the
//! same generic 401.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use service_core::error::AppError;
use time::OffsetDateTime;

use crate::models::{Session, SessionHandle, User};
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Authenticated caller, attached to the request by [`require_session`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub handle: SessionHandle,
    pub session: Session,
    pub user: User,
}

pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let handle = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().trim())
        .filter(|v| !v.is_empty())
        .map(|v| SessionHandle::new(v.to_string()))
        .ok_or_else(AppError::unauthorized)?;

    let session = state
        .sessions
        .get(&handle)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    if session.is_expired(Utc::now()) {
        if let Err(e) = state.sessions.invalidate(&handle).await {
            tracing::warn!(error = %e, "Failed to drop expired session");
        }
        return Err(AppError::unauthorized());
    }

    let user = match state.repo.find_user_by_id(session.user_id).await? {
        Some(user) => user,
        None => {
            tracing::warn!(user_id = %session.user_id, "Session refers to a missing user");
            return Err(AppError::unauthorized());
        }
    };

    req.extensions_mut().insert(RequestContext {
        handle,
        session,
        user,
    });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(AppError::unauthorized)
    }
}

/// Cookie delivering `handle`, expiring together with `session`.
pub fn session_cookie(handle: &SessionHandle, session: &Session, secure: bool) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, handle.as_str().to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/");

    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(session.expiry_utc.timestamp()) {
        builder = builder.expires(expires);
    }

    builder.build()
}

pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

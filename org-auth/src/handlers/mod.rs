pub mod auth;
pub mod invite;
pub mod oauth;
pub mod org;
pub mod totp;

use axum::Json;
use axum_extra::extract::cookie::CookieJar;

use crate::dtos::auth::SessionResponse;
use crate::middleware::session_cookie;
use crate::models::{Session, SessionHandle};
use crate::AppState;

/// Set the session cookie for a freshly created session.
pub(crate) fn with_session(
    state: &AppState,
    jar: CookieJar,
    handle: &SessionHandle,
    session: &Session,
) -> (CookieJar, Json<SessionResponse>) {
    let jar = jar.add(session_cookie(
        handle,
        session,
        state.config.session.cookie_secure,
    ));
    (
        jar,
        Json(SessionResponse {
            ok: true,
            user_id: session.user_id,
            active_org_id: session.active_org_id,
        }),
    )
}

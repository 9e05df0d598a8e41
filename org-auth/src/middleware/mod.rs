pub mod auth;
pub mod org;
pub mod role;

pub use auth::{
    clear_session_cookie, require_session, session_cookie, RequestContext, SESSION_COOKIE,
};
pub use org::{org_context_middleware, OrgContext};
pub use role::require_role;

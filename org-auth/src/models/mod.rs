pub mod credential;
pub mod identity;
pub mod invite;
pub mod membership;
pub mod organization;
pub mod role;
pub mod session;
pub mod totp;
pub mod user;

pub use credential::LocalCredential;
pub use identity::UserIdentity;
pub use invite::Invite;
pub use membership::{OrgMembership, RoleMapping, RoleReconcile};
pub use organization::Organization;
pub use role::OrgRole;
pub use session::{Session, SessionHandle};
pub use totp::TotpSecret;
pub use user::User;

//! Services layer for org-auth.
//!
//! Storage boundary, session store, identity and role resolution, invites,
//! and the sign-in flows built on top of them.

pub mod auth;
mod database;
pub mod error;
mod identity;
pub mod invite;
mod memory;
mod org;
pub mod providers;
mod repository;
pub mod session;

pub use auth::{AuthService, AuthSettings, SignedIn, TotpSetup, LOCAL_PROVIDER};
pub use database::Database;
pub use error::ServiceError;
pub use identity::IdentityResolver;
pub use invite::{AcceptedInvite, InviteManager, IssuedInvite, DEFAULT_INVITE_TTL_HOURS};
pub use memory::InMemoryRepository;
pub use org::OrgRoleResolver;
pub use providers::{IdentityProvider, OidcProvider, ProviderRegistry, VerifiedIdentity};
pub use repository::{AuthRepository, RedeemedInvite};
pub use session::{spawn_session_purger, MemorySessionStore, RedisSessionStore, SessionStore};

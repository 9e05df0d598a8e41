//! Server-held session state and the opaque handle that addresses it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session record. Created and mutated only by the session subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub active_org_id: Option<Uuid>,
    /// Identity provider used to authenticate ("local" for passwords).
    pub provider: String,
    pub expiry_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, active_org_id: Option<Uuid>, provider: &str, ttl: Duration) -> Self {
        Self {
            user_id,
            active_org_id,
            provider: provider.to_string(),
            expiry_utc: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }
}

/// Opaque, unguessable session handle carried in the `session` cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Handles are bearer secrets; keep them out of logs.
impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionHandle(<redacted>)")
    }
}

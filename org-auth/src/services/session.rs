//! Session store: opaque handle -> server-held [`Session`].
//!
//! Expiry is not enforced here; `get` returns logically expired records and
//! the authentication layer treats them as absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use super::ServiceError;
use crate::models::{Session, SessionHandle};
use crate::utils::generate_secure_token;

/// Retries on handle collision. With 256-bit handles a second attempt is
/// already astronomically unlikely; the bound keeps a broken RNG from spinning.
const MAX_CREATE_ATTEMPTS: usize = 4;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `session` under a fresh unguessable handle.
    async fn create(&self, session: &Session) -> Result<SessionHandle, ServiceError>;

    async fn get(&self, handle: &SessionHandle) -> Result<Option<Session>, ServiceError>;

    /// Remove the session. Idempotent.
    async fn invalidate(&self, handle: &SessionHandle) -> Result<(), ServiceError>;

    /// Drop records whose expiry has passed. Returns how many were removed.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, ServiceError> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// Sharded concurrent map; no store-wide lock.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<SessionHandle, ServiceError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let handle = generate_secure_token();
            if let Entry::Vacant(slot) = self.sessions.entry(handle.clone()) {
                slot.insert(session.clone());
                return Ok(SessionHandle::new(handle));
            }
            tracing::warn!("Session handle collision, regenerating");
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not allocate a unique session handle"
        )))
    }

    async fn get(&self, handle: &SessionHandle) -> Result<Option<Session>, ServiceError> {
        Ok(self.sessions.get(handle.as_str()).map(|s| s.clone()))
    }

    async fn invalidate(&self, handle: &SessionHandle) -> Result<(), ServiceError> {
        self.sessions.remove(handle.as_str());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Redis-backed store shared by every server process.
///
/// Records are JSON under `session:{handle}` with a TTL matching the session
/// expiry; `SET NX` makes creation collision-safe across processes.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ServiceError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis session store");
        Ok(Self { conn })
    }

    fn key(handle: &str) -> String {
        format!("session:{}", handle)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> Result<SessionHandle, ServiceError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;
        let ttl_secs = (session.expiry_utc - Utc::now()).num_seconds().max(1);

        let mut conn = self.conn.clone();
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let handle = generate_secure_token();
            let created: Option<String> = redis::cmd("SET")
                .arg(Self::key(&handle))
                .arg(&payload)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            if created.is_some() {
                return Ok(SessionHandle::new(handle));
            }
            tracing::warn!("Session handle collision, regenerating");
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not allocate a unique session handle"
        )))
    }

    async fn get(&self, handle: &SessionHandle) -> Result<Option<Session>, ServiceError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::key(handle.as_str()))
            .query_async(&mut conn)
            .await?;

        match payload {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding undecodable session record");
                    Ok(None)
                }
            },
        }
    }

    async fn invalidate(&self, handle: &SessionHandle) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(handle.as_str()))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// Periodically drop expired sessions from stores that do not expire records themselves.
pub fn spawn_session_purger(
    store: Arc<dyn SessionStore>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    })
}

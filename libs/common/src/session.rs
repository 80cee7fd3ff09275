//! Server-side sessions
//!
//! A session is a snapshot of the user taken at login. It lives in the
//! session store under an opaque id that the client holds in the `sid`
//! cookie; the same id is the `jti` of the bearer token issued with it.
//! [`SessionResolver`] turns either credential back into a session.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{cache::RedisPool, roles::Role, token::JwtService};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Default session lifetime, 24 hours
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400);

/// Session snapshot taken at login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl SessionData {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Generate a fresh opaque session id
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Storage for sessions and revoked token ids
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a session for `ttl`
    async fn insert(&self, session_id: &str, session: &SessionData, ttl: Duration) -> Result<()>;

    /// Load a session, `None` when absent or expired
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>>;

    /// Remove a session
    async fn remove(&self, session_id: &str) -> Result<()>;

    /// Reject the token with this `jti` for `ttl`
    async fn revoke_token(&self, token_id: &str, ttl: Duration) -> Result<()>;

    /// Whether the token with this `jti` has been revoked
    async fn is_token_revoked(&self, token_id: &str) -> Result<bool>;
}

/// Session store backed by Redis key expiry
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_pool: RedisPool,
}

impl RedisSessionStore {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    fn revoked_key(token_id: &str) -> String {
        format!("revoked_token:{}", token_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, session_id: &str, session: &SessionData, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(session)?;
        self.redis_pool
            .set(
                &Self::session_key(session_id),
                &payload,
                Some(ttl.as_secs().max(1)),
            )
            .await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionData>> {
        match self.redis_pool.get(&Self::session_key(session_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.redis_pool.delete(&Self::session_key(session_id)).await
    }

    async fn revoke_token(&self, token_id: &str, ttl: Duration) -> Result<()> {
        self.redis_pool
            .set(&Self::revoked_key(token_id), "1", Some(ttl.as_secs().max(1)))
            .await
    }

    async fn is_token_revoked(&self, token_id: &str) -> Result<bool> {
        Ok(self
            .redis_pool
            .get(&Self::revoked_key(token_id))
            .await?
            .is_some())
    }
}

/// In-process session store for tests and single-node development
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    revoked: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session_id: &str, session: &SessionData, ttl: Duration) -> Result<()> {
        let mut stored = session.clone();
        let ttl_expiry = Utc::now() + chrono::Duration::from_std(ttl)?;
        stored.expires_at = stored.expires_at.min(ttl_expiry);
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), stored);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionData>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn revoke_token(&self, token_id: &str, ttl: Duration) -> Result<()> {
        let until = Utc::now() + chrono::Duration::from_std(ttl)?;
        self.revoked
            .write()
            .await
            .insert(token_id.to_string(), until);
        Ok(())
    }

    async fn is_token_revoked(&self, token_id: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .revoked
            .read()
            .await
            .get(token_id)
            .is_some_and(|until| *until > now))
    }
}

/// How the request proved its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChannel {
    Cookie,
    Bearer,
}

/// Session attached to an authenticated request
#[derive(Debug, Clone)]
pub struct CurrentSession {
    /// Session id, or the token `jti` for bearer requests
    pub session_id: String,
    pub channel: AuthChannel,
    pub data: SessionData,
}

/// Session resolution failures
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

/// Resolves a cookie session id or a bearer token into a session
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn SessionStore>,
    jwt_service: JwtService,
    lookup_timeout: Duration,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn SessionStore>, jwt_service: JwtService, lookup_timeout: Duration) -> Self {
        Self {
            store,
            jwt_service,
            lookup_timeout,
        }
    }

    /// Authenticate with whichever credential is present.
    ///
    /// The cookie is tried first; a bearer token authenticates on its own
    /// when the cookie is missing or no longer maps to a session.
    pub async fn resolve(
        &self,
        session_id: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<CurrentSession, ResolveError> {
        if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
            let loaded = self.with_timeout(self.store.load(session_id)).await?;

            match loaded {
                Some(data) if !data.is_expired(Utc::now()) => {
                    return Ok(CurrentSession {
                        session_id: session_id.to_string(),
                        channel: AuthChannel::Cookie,
                        data,
                    });
                }
                _ => debug!("Session cookie does not map to a live session"),
            }
        }

        if let Some(token) = bearer {
            let claims = self.jwt_service.validate(token).map_err(|e| {
                debug!("Bearer token rejected: {}", e);
                ResolveError::NotAuthenticated
            })?;

            let revoked = self
                .with_timeout(self.store.is_token_revoked(&claims.jti))
                .await?;
            if revoked {
                debug!("Bearer token {} has been revoked", claims.jti);
                return Err(ResolveError::NotAuthenticated);
            }

            return Ok(CurrentSession {
                session_id: claims.jti.clone(),
                channel: AuthChannel::Bearer,
                data: claims.to_session(),
            });
        }

        Err(ResolveError::NotAuthenticated)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T, ResolveError> {
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(result) => result.map_err(ResolveError::Store),
            Err(_) => {
                warn!(
                    "Session store did not answer within {:?}",
                    self.lookup_timeout
                );
                Err(ResolveError::Store(anyhow::anyhow!(
                    "session lookup timed out after {:?}",
                    self.lookup_timeout
                )))
            }
        }
    }
}

/// `Set-Cookie` value establishing the session cookie
pub fn session_cookie(session_id: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value clearing the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{DEFAULT_TOKEN_EXPIRY, JwtConfig};

    fn jwt() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            token_expiry: DEFAULT_TOKEN_EXPIRY,
        })
    }

    fn snapshot() -> SessionData {
        SessionData {
            user_id: Uuid::new_v4(),
            username: "bursar".to_string(),
            name: "Bursar".to_string(),
            role: Role::Manager,
            expires_at: Utc::now() + chrono::Duration::hours(24),
        }
    }

    /// Store whose reads never complete
    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
        async fn insert(&self, _: &str, _: &SessionData, _: Duration) -> Result<()> {
            std::future::pending().await
        }
        async fn load(&self, _: &str) -> Result<Option<SessionData>> {
            std::future::pending().await
        }
        async fn remove(&self, _: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn revoke_token(&self, _: &str, _: Duration) -> Result<()> {
            std::future::pending().await
        }
        async fn is_token_revoked(&self, _: &str) -> Result<bool> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cookie_session_resolves() {
        let store = Arc::new(MemorySessionStore::new());
        let data = snapshot();
        store.insert("abc", &data, DEFAULT_SESSION_TTL).await.unwrap();

        let resolver = SessionResolver::new(store, jwt(), Duration::from_secs(1));
        let current = resolver.resolve(Some("abc"), None).await.unwrap();

        assert_eq!(current.channel, AuthChannel::Cookie);
        assert_eq!(current.session_id, "abc");
        assert_eq!(current.data.username, "bursar");
    }

    #[tokio::test]
    async fn bearer_token_alone_authenticates() {
        let store = Arc::new(MemorySessionStore::new());
        let jwt = jwt();
        let token = jwt.issue("sid-9", &snapshot()).unwrap();

        let resolver = SessionResolver::new(store, jwt, Duration::from_secs(1));
        let current = resolver.resolve(None, Some(&token)).await.unwrap();

        assert_eq!(current.channel, AuthChannel::Bearer);
        assert_eq!(current.session_id, "sid-9");
        assert_eq!(current.data.role, Role::Manager);
    }

    #[tokio::test]
    async fn stale_cookie_falls_back_to_bearer() {
        let store = Arc::new(MemorySessionStore::new());
        let jwt = jwt();
        let token = jwt.issue("sid", &snapshot()).unwrap();

        let resolver = SessionResolver::new(store, jwt, Duration::from_secs(1));
        let current = resolver.resolve(Some("gone"), Some(&token)).await.unwrap();
        assert_eq!(current.channel, AuthChannel::Bearer);
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let store = Arc::new(MemorySessionStore::new());
        let jwt = jwt();
        let token = jwt.issue("sid-r", &snapshot()).unwrap();
        store
            .revoke_token("sid-r", Duration::from_secs(60))
            .await
            .unwrap();

        let resolver = SessionResolver::new(store, jwt, Duration::from_secs(1));
        let result = resolver.resolve(None, Some(&token)).await;
        assert!(matches!(result, Err(ResolveError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn nothing_presented_is_not_authenticated() {
        let resolver = SessionResolver::new(
            Arc::new(MemorySessionStore::new()),
            jwt(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            resolver.resolve(None, None).await,
            Err(ResolveError::NotAuthenticated)
        ));
        assert!(matches!(
            resolver.resolve(None, Some("not-a-jwt")).await,
            Err(ResolveError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let resolver =
            SessionResolver::new(Arc::new(StalledStore), jwt(), Duration::from_millis(20));

        let result = resolver.resolve(Some("abc"), None).await;
        assert!(matches!(result, Err(ResolveError::Store(_))));
    }

    #[tokio::test]
    async fn memory_store_removes_sessions() {
        let store = MemorySessionStore::new();
        store
            .insert("abc", &snapshot(), DEFAULT_SESSION_TTL)
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);

        store.remove("abc").await.unwrap();
        assert!(store.load("abc").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc", DEFAULT_SESSION_TTL, false);
        assert_eq!(
            cookie,
            "sid=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400"
        );
        assert!(clear_session_cookie(true).ends_with("Max-Age=0; Secure"));
    }
}

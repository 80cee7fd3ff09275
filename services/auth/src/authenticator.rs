//! Session authenticator
//!
//! Verifies credentials against the user store, establishes server-side
//! sessions with their bearer tokens, and tears them down again.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use common::{
    session::{SessionData, SessionStore, new_session_id},
    token::JwtService,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    models::{NewUser, RegisterRequest, User},
    password::{Credential, DUMMY_PASSWORD_HASH, hash_password},
    repositories::UserStore,
    validation::validate_registration,
};

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session_id: String,
    pub session: SessionData,
    pub token: String,
}

/// Login, logout and registration over the user and session stores
#[derive(Clone)]
pub struct SessionAuthenticator {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    jwt_service: JwtService,
    session_ttl: Duration,
    store_timeout: Duration,
}

impl SessionAuthenticator {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        jwt_service: JwtService,
        session_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            jwt_service,
            session_ttl,
            store_timeout,
        }
    }

    /// Verify credentials and open a session.
    ///
    /// Every rejection is reported as `InvalidCredentials`; the reason is
    /// only logged.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<LoginOutcome> {
        let user = self.users.find_by_username(username).await?;

        // Inactive and unknown users pay for the same hash verification as a
        // wrong password.
        let stored = match &user {
            Some(user) if user.is_active => user.password_hash.as_str(),
            _ => DUMMY_PASSWORD_HASH,
        };
        let (matches, legacy) = self.check_password(stored, password).await?;

        let user = match user {
            Some(user) if user.is_active => user,
            Some(_) => {
                info!("Login rejected for inactive user: {}", username);
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                info!("Login rejected for unknown user: {}", username);
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !matches {
            info!("Login rejected for user {}: wrong password", username);
            return Err(AuthError::InvalidCredentials);
        }

        if legacy {
            warn!(
                "User {} authenticated with a legacy plaintext credential; replacing it with a hash",
                username
            );
            let password = password.to_string();
            let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .map_err(|e| AuthError::Internal(e.into()))?
                .map_err(AuthError::Internal)?;
            self.users.update_password_hash(user.id, &hashed).await?;
        }

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.session_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::Internal(anyhow::anyhow!(
                    "session lifetime {:?} is out of range",
                    self.session_ttl
                ))
            })?;
        self.users.record_login(user.id, now).await?;

        let session = SessionData {
            user_id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            role: user.role,
            expires_at,
        };
        let session_id = new_session_id();

        let token = self
            .jwt_service
            .issue(&session_id, &session)
            .map_err(AuthError::Internal)?;

        self.with_timeout(self.sessions.insert(&session_id, &session, self.session_ttl))
            .await
            .map_err(|e| {
                error!("Failed to persist session for user {}: {:#}", username, e);
                AuthError::Internal(e)
            })?;

        info!("User {} logged in", username);

        let mut user = user;
        user.last_login = Some(now);

        Ok(LoginOutcome {
            user,
            session_id,
            session,
            token,
        })
    }

    /// Destroy the session behind the cookie and revoke the bearer token
    pub async fn logout(&self, session_id: Option<&str>, bearer: Option<&str>) -> AuthResult<()> {
        if let Some(token) = bearer {
            match self.jwt_service.validate(token) {
                Ok(claims) => {
                    let remaining = claims.remaining_lifetime(Utc::now());
                    if remaining > 0 {
                        self.with_timeout(
                            self.sessions
                                .revoke_token(&claims.jti, Duration::from_secs(remaining)),
                        )
                        .await
                        .map_err(AuthError::SessionDestroyFailure)?;
                    }
                    self.with_timeout(self.sessions.remove(&claims.jti))
                        .await
                        .map_err(AuthError::SessionDestroyFailure)?;
                    info!("Revoked token for user {}", claims.username);
                }
                Err(e) => debug!("Ignoring invalid bearer token at logout: {}", e),
            }
        }

        if let Some(session_id) = session_id.filter(|id| !id.is_empty()) {
            // Tokens from the same login carry the session id as their jti
            self.with_timeout(self.sessions.revoke_token(
                session_id,
                Duration::from_secs(self.jwt_service.token_expiry()),
            ))
            .await
            .map_err(AuthError::SessionDestroyFailure)?;
            self.with_timeout(self.sessions.remove(session_id))
                .await
                .map_err(AuthError::SessionDestroyFailure)?;
            info!("Destroyed session");
        }

        Ok(())
    }

    /// Create a user account
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        validate_registration(&request)?;

        if self
            .users
            .find_by_username(&request.username)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateUsername);
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(e.into()))?
            .map_err(AuthError::Internal)?;

        let user = self
            .users
            .create(&NewUser {
                username: request.username,
                password_hash,
                name: request.name.trim().to_string(),
                role: request.role,
                is_active: request.is_active,
            })
            .await?;

        info!("Registered user {} with role {}", user.username, user.role);
        Ok(user)
    }

    async fn check_password(&self, stored: &str, password: &str) -> AuthResult<(bool, bool)> {
        let stored = stored.to_string();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            let credential = Credential::from_stored(&stored);
            (credential.verify(&password), credential.is_legacy())
        })
        .await
        .map_err(|e| AuthError::Internal(e.into()))
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| {
                anyhow::anyhow!("session store timed out after {:?}", self.store_timeout)
            })?
    }
}

//! Bearer token service
//!
//! Tokens are HS256-signed JWTs mirroring the server-side session: the
//! `jti` claim is the session id, so a token can be revoked together with
//! the session it was issued alongside.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{roles::Role, session::SessionData};

/// Default token lifetime, 24 hours
pub const DEFAULT_TOKEN_EXPIRY: u64 = 86_400;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Token expiration time in seconds (default: 24 hours)
    pub token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: HMAC secret used to sign and verify tokens (required)
    /// - `JWT_TOKEN_EXPIRY`: Token expiry in seconds (default: 86400)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 bytes long");
        }

        let token_expiry = std::env::var("JWT_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_EXPIRY);

        Ok(JwtConfig {
            secret,
            token_expiry,
        })
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub username: String,
    pub name: String,
    pub role: Role,
    /// Session id the token was issued with
    pub jti: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

impl Claims {
    /// Session snapshot carried by the token
    pub fn to_session(&self) -> SessionData {
        SessionData {
            user_id: self.sub,
            username: self.username.clone(),
            name: self.name.clone(),
            role: self.role,
            expires_at: Utc
                .timestamp_opt(self.exp as i64, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Seconds left before the token expires
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> u64 {
        self.exp.saturating_sub(now.timestamp().max(0) as u64)
    }
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Issue a token for a session
    pub fn issue(&self, session_id: &str, session: &SessionData) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;

        let claims = Claims {
            sub: session.user_id,
            username: session.username.clone(),
            name: session.name.clone(),
            role: session.role,
            jti: session_id.to_string(),
            iat: now,
            exp: now + self.config.token_expiry,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Get the token expiry time
    pub fn token_expiry(&self) -> u64 {
        self.config.token_expiry
    }
}

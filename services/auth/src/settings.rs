//! Service settings loaded with the `config` crate
//!
//! Values come from `AUTH_`-prefixed environment variables on top of the
//! defaults below, e.g. `AUTH_BIND_ADDRESS=127.0.0.1:4000`.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Longest accepted session lifetime, one year
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Authentication service settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Server-side session lifetime in seconds
    pub session_ttl_secs: u64,
    /// Upper bound on a single session store call in milliseconds
    pub session_store_timeout_ms: u64,
    /// Add the `Secure` attribute to the session cookie
    pub secure_cookies: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:3000")?
            .set_default("session_ttl_secs", 86_400_i64)?
            .set_default("session_store_timeout_ms", 5_000_i64)?
            .set_default("secure_cookies", false)?
            .add_source(config::Environment::with_prefix("AUTH").try_parsing(true))
            .build()?
            .try_deserialize()?;

        anyhow::ensure!(
            (1..=MAX_SESSION_TTL_SECS).contains(&settings.session_ttl_secs),
            "AUTH_SESSION_TTL_SECS must be between 1 and {}, got {}",
            MAX_SESSION_TTL_SECS,
            settings.session_ttl_secs
        );

        Ok(settings)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_store_timeout(&self) -> Duration {
        Duration::from_millis(self.session_store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:3000");
        assert_eq!(settings.session_ttl(), Duration::from_secs(86_400));
        assert_eq!(settings.session_store_timeout(), Duration::from_secs(5));
        assert!(!settings.secure_cookies);
    }

    #[test]
    #[serial]
    fn environment_overrides() {
        unsafe {
            std::env::set_var("AUTH_BIND_ADDRESS", "127.0.0.1:4000");
            std::env::set_var("AUTH_SECURE_COOKIES", "true");
        }

        let settings = Settings::load().unwrap();
        assert_eq!(settings.bind_address, "127.0.0.1:4000");
        assert!(settings.secure_cookies);

        unsafe {
            std::env::remove_var("AUTH_BIND_ADDRESS");
            std::env::remove_var("AUTH_SECURE_COOKIES");
        }
    }

    #[test]
    #[serial]
    fn out_of_range_session_ttl_is_rejected() {
        for value in ["0", "18446744073709551615"] {
            unsafe {
                std::env::set_var("AUTH_SESSION_TTL_SECS", value);
            }

            assert!(Settings::load().is_err(), "{value}");
        }

        unsafe {
            std::env::remove_var("AUTH_SESSION_TTL_SECS");
        }
    }
}

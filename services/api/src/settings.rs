//! API service settings
//!
//! Defaults can be overridden with `API_`-prefixed environment variables,
//! e.g. `API_INVOICE_DUE_DAYS=15`.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Longest accepted default due period
pub const MAX_INVOICE_DUE_DAYS: i64 = 3_650;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    /// Upper bound on a single session store lookup in milliseconds
    pub session_store_timeout_ms: u64,
    /// Days until a new invoice is due when no due date is given
    pub invoice_due_days: i64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:3001")?
            .set_default("session_store_timeout_ms", 5_000_i64)?
            .set_default("invoice_due_days", 30_i64)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()?;

        anyhow::ensure!(
            (0..=MAX_INVOICE_DUE_DAYS).contains(&settings.invoice_due_days),
            "API_INVOICE_DUE_DAYS must be between 0 and {}, got {}",
            MAX_INVOICE_DUE_DAYS,
            settings.invoice_due_days
        );

        Ok(settings)
    }

    pub fn session_store_timeout(&self) -> Duration {
        Duration::from_millis(self.session_store_timeout_ms)
    }
}

//! Environment-driven configuration

use std::time::Duration;

/// Configuration for the governance core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    /// Business default TTL for cached AI responses (one hour)
    pub cache_default_ttl_seconds: i64,
    /// How long an invite token stays redeemable
    pub invite_ttl_hours: i64,
    /// Cadence of the hygiene sweeps (expired cache entries, dead invites)
    pub sweep_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            cache_default_ttl_seconds: 3_600,
            invite_ttl_hours: 24 * 7,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl CoreConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for everything except `DATABASE_URL`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or(defaults.database_url),
            cache_default_ttl_seconds: env_i64(
                "CACHE_DEFAULT_TTL_SECONDS",
                defaults.cache_default_ttl_seconds,
            ),
            invite_ttl_hours: env_i64("INVITE_TTL_HOURS", defaults.invite_ttl_hours),
            sweep_interval: Duration::from_secs(
                env_i64("SWEEP_INTERVAL_SECONDS", 300).max(1) as u64,
            ),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

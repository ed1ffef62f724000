//! Environment-based configuration, loaded once at startup.

use std::time::Duration;

use crate::types::position::{PRICE_SCALE, Price};

const DEFAULT_STARTING_BALANCE: i64 = 1_000_000; // whole currency units

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Postgres connection string; without it the engine runs memory-only.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub reconcile_interval: Duration,
    pub price_fetch_timeout: Duration,
    pub price_cache_ttl: Duration,
    pub flush_interval: Duration,
    pub starting_balance: Price,
    pub price_feed_url: String,
    pub price_feed_suffix: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:4000"),
            database_url: std::env::var("DATABASE_URL").ok(),
            jwt_secret: env_or("JWT_SECRET", "dev-secret-change-me"),
            reconcile_interval: Duration::from_secs(env_parsed("RECONCILE_INTERVAL_SECS", 5)),
            price_fetch_timeout: Duration::from_millis(env_parsed("PRICE_FETCH_TIMEOUT_MS", 3000)),
            price_cache_ttl: Duration::from_millis(env_parsed("PRICE_CACHE_TTL_MS", 2000)),
            flush_interval: Duration::from_secs(env_parsed("FLUSH_INTERVAL_SECS", 10)),
            starting_balance: env_parsed("STARTING_BALANCE", DEFAULT_STARTING_BALANCE)
                * PRICE_SCALE,
            price_feed_url: env_or("PRICE_FEED_URL", "https://query1.finance.yahoo.com"),
            price_feed_suffix: env_or("PRICE_FEED_SUFFIX", ".NS"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Runtime configuration resolved once at startup from `.env`/environment.

use serde::Serialize;

/// Application configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// Write/admin endpoints require this key when set. Production mode
    /// refuses to start without one.
    pub api_key: Option<String>,
    pub production: bool,
    pub pool_size: usize,
    pub cache_max_size: usize,
    pub scheduler_enabled: bool,
    /// Dev polling interval override, minutes. `None` uses the KST calendar.
    pub scheduler_interval_minutes: Option<u64>,
    pub upstream_timeout_secs: u64,
    /// Token-bucket refill: requests allowed per host per second.
    pub upstream_rate_per_sec: u32,
    pub default_collect_days: u32,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let api_key = std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty());
        if production && api_key.is_none() {
            anyhow::bail!("API_KEY must be set when APP_ENV=production");
        }

        let scheduler_interval_minutes = std::env::var("SCHEDULER_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&m| m > 0);

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./etfwatch.db".to_string()),
            port: env_parse("PORT", 8000),
            api_key,
            production,
            pool_size: env_parse("DB_POOL_SIZE", 4).max(1),
            cache_max_size: env_parse("CACHE_MAX_SIZE", 1000).max(16),
            scheduler_enabled: env_flag("SCHEDULER_ENABLED", true),
            scheduler_interval_minutes,
            upstream_timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECS", 30),
            upstream_rate_per_sec: env_parse("UPSTREAM_RATE_PER_SEC", 2).max(1),
            default_collect_days: env_parse("DEFAULT_COLLECT_DAYS", 30),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./etfwatch.db".to_string(),
            port: 8000,
            api_key: None,
            production: false,
            pool_size: 4,
            cache_max_size: 1000,
            scheduler_enabled: false,
            scheduler_interval_minutes: None,
            upstream_timeout_secs: 30,
            upstream_rate_per_sec: 2,
            default_collect_days: 30,
        }
    }
}

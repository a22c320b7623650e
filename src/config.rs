use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Redis (progress publication is off when unset)
    pub redis_url: Option<String>,
    pub progress_ttl_seconds: u64,

    // PostgreSQL (in-memory store when unset)
    pub database_url: Option<String>,
    pub db_max_connections: u32,

    // Fetching
    pub fetch_timeout_ms: u64,
    pub xtream_timeout_ms: u64,
    pub max_m3u_size_mb: u64,
    pub max_xmltv_size_mb: u64,
    pub user_agent: String,

    // Sync
    pub sync_concurrency: usize,
    pub xtream_expand_series: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env_or("PORT", 3001),

            // Redis
            redis_url: env_opt("REDIS_URL"),
            progress_ttl_seconds: env_or("PROGRESS_TTL_SECONDS", 3600),

            // PostgreSQL
            database_url: env_opt("DATABASE_URL"),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 15),

            // Fetching
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", 120_000), // 2 minutes
            xtream_timeout_ms: env_or("XTREAM_TIMEOUT_MS", 30_000),
            max_m3u_size_mb: env_or("MAX_M3U_SIZE_MB", 500),
            max_xmltv_size_mb: env_or("MAX_XMLTV_SIZE_MB", 500),
            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),

            // Sync
            sync_concurrency: env_or("SYNC_CONCURRENCY", 4usize).max(1),
            xtream_expand_series: env::var("XTREAM_EXPAND_SERIES")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Options handed to the sync orchestrator
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            xtream_timeout: Duration::from_millis(self.xtream_timeout_ms),
            concurrency: self.sync_concurrency,
            expand_series: self.xtream_expand_series,
        }
    }

    /// Largest body the fetcher accepts; the bigger of the two limits
    pub fn max_body_bytes(&self) -> u64 {
        self.max_m3u_size_mb.max(self.max_xmltv_size_mb) * 1024 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Timeout for M3U and XMLTV downloads
    pub fetch_timeout: Duration,
    /// Timeout for each Xtream API call
    pub xtream_timeout: Duration,
    /// Syncs run at once by `sync_many`
    pub concurrency: usize,
    /// Fetch `get_series_info` for every Xtream series
    pub expand_series: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(120),
            xtream_timeout: Duration::from_secs(30),
            concurrency: 4,
            expand_series: false,
        }
    }
}

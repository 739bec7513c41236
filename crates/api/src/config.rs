//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::CheckoutConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory store is
///   used when unset
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `CHECKOUT_TIMEOUT_MS`: overall checkout deadline (default: `10000`)
/// - `LOCK_TIMEOUT_MS`: per-lock wait before a conflict (default: `5000`)
/// - `LOCK_RETRIES`: checkout restarts after a lock conflict (default: `3`)
/// - `ACTIVITY_QUEUE_CAPACITY`: pending activity entries (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub checkout_timeout: Duration,
    pub lock_timeout: Duration,
    pub lock_retries: u32,
    pub activity_queue_capacity: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            checkout_timeout: Duration::from_millis(env_or("CHECKOUT_TIMEOUT_MS", 10_000)),
            lock_timeout: Duration::from_millis(env_or("LOCK_TIMEOUT_MS", 5_000)),
            lock_retries: env_or("LOCK_RETRIES", defaults.lock_retries),
            activity_queue_capacity: env_or(
                "ACTIVITY_QUEUE_CAPACITY",
                defaults.activity_queue_capacity,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            timeout: self.checkout_timeout,
            lock_retries: self.lock_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            db_max_connections: 10,
            checkout_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(5),
            lock_retries: 3,
            activity_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.activity_queue_capacity, 1024);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_checkout_settings_match_domain_defaults() {
        assert_eq!(Config::default().checkout(), CheckoutConfig::default());
    }

    #[test]
    fn test_checkout_settings_follow_config() {
        let config = Config {
            checkout_timeout: Duration::from_millis(250),
            lock_retries: 0,
            ..Config::default()
        };
        let checkout = config.checkout();
        assert_eq!(checkout.timeout, Duration::from_millis(250));
        assert_eq!(checkout.lock_retries, 0);
    }
}

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound for any single engine storage operation; exceeding it
    /// surfaces a TIMEOUT error instead of hanging the request.
    pub query_timeout: Duration,
    /// Ranking snapshots older than this are recomputed before a read is
    /// answered.
    pub snapshot_max_age: Duration,
    pub health_check: HealthCheckConfig,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(DbConfigError::Missing {
                key: "DATABASE_URL",
            })?;

        Ok(Self {
            url,
            max_connections: env_u32("DB_MAX_CONNECTIONS", 10),
            acquire_timeout: Duration::from_millis(env_u64("DB_ACQUIRE_TIMEOUT_MS", 5000)),
            query_timeout: Duration::from_millis(env_u64("DB_QUERY_TIMEOUT_MS", 10_000)),
            snapshot_max_age: Duration::from_millis(env_u64("LEADERBOARD_SNAPSHOT_MAX_AGE_MS", 30_000)),
            health_check: HealthCheckConfig::from_env(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl HealthCheckConfig {
    fn from_env() -> Self {
        Self {
            interval: Duration::from_millis(env_u64("DB_HEALTH_CHECK_INTERVAL_MS", 5000)),
            timeout: Duration::from_millis(env_u64("DB_HEALTH_CHECK_TIMEOUT_MS", 3000)),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("Missing required env var: {key}")]
    Missing { key: &'static str },
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

pub mod config;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::config::{DbConfig, DbConfigError};

/// Connection handle shared by the engine and the HTTP layer. Owns the pool
/// and a background health monitor; everything else issues plain sqlx
/// queries through `pool()`.
#[derive(Clone)]
pub struct Database {
    config: DbConfig,
    pool: PgPool,
    health: Arc<RwLock<HealthSnapshot>>,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            last_error: None,
            checked_at: None,
        }
    }
}

impl Database {
    pub async fn from_env() -> Result<Arc<Self>, DbInitError> {
        let config = DbConfig::from_env()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(DbInitError::Sqlx)?;

        let db = Arc::new(Self {
            config,
            pool,
            health: Arc::new(RwLock::new(HealthSnapshot::default())),
        });

        db.start_health_monitor();

        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub async fn health_status(&self) -> HealthSnapshot {
        self.health.read().await.clone()
    }

    fn start_health_monitor(self: &Arc<Self>) {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            db.health_monitor_loop().await;
        });
    }

    async fn health_monitor_loop(self: Arc<Self>) {
        let interval = self.config.health_check.interval;

        loop {
            let started = tokio::time::Instant::now();
            let snapshot = self.check_health().await;
            {
                let mut guard = self.health.write().await;
                *guard = snapshot;
            }

            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
    }

    async fn check_health(&self) -> HealthSnapshot {
        let timeout = self.config.health_check.timeout;
        let started = std::time::Instant::now();

        let result =
            tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&self.pool)).await;

        match result {
            Ok(Ok(_)) => HealthSnapshot {
                healthy: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                last_error: None,
                checked_at: Some(Utc::now()),
            },
            Ok(Err(err)) => HealthSnapshot {
                healthy: false,
                latency_ms: None,
                last_error: Some(err.to_string()),
                checked_at: Some(Utc::now()),
            },
            Err(_) => HealthSnapshot {
                healthy: false,
                latency_ms: None,
                last_error: Some("health check timeout".to_string()),
                checked_at: Some(Utc::now()),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

//! Health check module
//! Reports the database and throttle cache; either may be absent when the
//! gateway runs with in-memory stand-ins.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

#[cfg(feature = "cache")]
use crate::cache::RedisPool;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub version: String,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    /// Not configured for this process
    Disabled,
}

impl HealthStatus {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            status: HealthState::Healthy,
            version: version.into(),
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn disabled() -> Self {
        Self {
            status: ComponentState::Disabled,
            response_time_ms: None,
            details: Some("in-memory".to_string()),
        }
    }
}

#[derive(Clone, Default)]
pub struct HealthChecker {
    db_pool: Option<PgPool>,
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
}

impl HealthChecker {
    pub fn new(db_pool: Option<PgPool>) -> Self {
        Self {
            db_pool,
            #[cfg(feature = "cache")]
            cache: None,
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, cache: Option<RedisPool>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn check_health(&self, version: &str) -> HealthStatus {
        let mut health_status = HealthStatus::new(version);

        let database = match &self.db_pool {
            Some(pool) => probe("database", check_database_health(pool)).await,
            None => ComponentHealth::disabled(),
        };
        health_status.checks.insert("database".to_string(), database);

        #[cfg(feature = "cache")]
        let cache = match &self.cache {
            Some(pool) => probe("cache", check_cache_health(pool)).await,
            None => ComponentHealth::disabled(),
        };
        #[cfg(not(feature = "cache"))]
        let cache = ComponentHealth::disabled();
        health_status.checks.insert("cache".to_string(), cache);

        if health_status
            .checks
            .values()
            .any(|c| c.status == ComponentState::Down)
        {
            health_status.status = HealthState::Unhealthy;
        }

        health_status
    }
}

async fn probe<F>(name: &str, check: F) -> ComponentHealth
where
    F: Future<Output = Result<u128, String>>,
{
    match timeout(CHECK_TIMEOUT, check).await {
        Ok(Ok(response_time)) => {
            info!("{} health check: OK ({}ms)", name, response_time);
            ComponentHealth::up(Some(response_time))
        }
        Ok(Err(e)) => {
            error!("{} health check failed: {}", name, e);
            ComponentHealth::down(Some(e))
        }
        Err(_) => {
            error!("{} health check timed out", name);
            ComponentHealth::down(Some("Timeout".to_string()))
        }
    }
}

pub async fn check_database_health(pool: &PgPool) -> Result<u128, String> {
    let start = Instant::now();
    crate::database::health_check(pool)
        .await
        .map(|_| start.elapsed().as_millis())
        .map_err(|e| e.to_string())
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(pool: &RedisPool) -> Result<u128, String> {
    let start = Instant::now();
    crate::cache::health_check(pool)
        .await
        .map(|_| start.elapsed().as_millis())
        .map_err(|e| e.to_string())
}

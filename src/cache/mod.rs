//! Redis connection pool backing the request throttle.
//!
//! Redis is optional: without the `cache` feature, or with
//! `SKIP_EXTERNALS=true`, the in-process throttle is used instead.

pub mod error;
pub mod throttle;

pub use error::CacheError;

#[cfg(feature = "cache")]
pub use redis_pool::*;

#[cfg(feature = "cache")]
mod redis_pool {
    use super::CacheError;
    use crate::config::CacheSettings;
    use bb8::Pool;
    use bb8_redis::RedisConnectionManager;
    use std::time::Duration;
    use tracing::{error, info, warn};

    /// Redis connection pool type alias
    pub type RedisPool = Pool<RedisConnectionManager>;

    /// Pool sizing and timeouts
    #[derive(Debug, Clone)]
    pub struct CacheConfig {
        pub redis_url: String,
        pub max_connections: u32,
        pub min_idle: u32,
        pub connection_timeout: Duration,
        pub max_lifetime: Duration,
        pub idle_timeout: Duration,
    }

    impl Default for CacheConfig {
        fn default() -> Self {
            Self {
                redis_url: "redis://127.0.0.1:6379".to_string(),
                max_connections: 10,
                min_idle: 1,
                connection_timeout: Duration::from_secs(5),
                max_lifetime: Duration::from_secs(300),
                idle_timeout: Duration::from_secs(60),
            }
        }
    }

    impl From<&CacheSettings> for CacheConfig {
        fn from(settings: &CacheSettings) -> Self {
            Self {
                redis_url: settings.redis_url.clone(),
                max_connections: settings.max_connections,
                ..CacheConfig::default()
            }
        }
    }

    /// Build the pool. A failed initial PING is logged, not fatal.
    pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
        info!(
            max_connections = config.max_connections,
            "Initializing Redis pool"
        );

        let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
            error!("Failed to create Redis connection manager: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .test_on_check_out(false)
            .build(manager)
            .await
            .map_err(|e| {
                error!("Failed to build Redis connection pool: {}", e);
                CacheError::ConnectionError(e.to_string())
            })?;

        if let Err(e) = health_check(&pool).await {
            warn!("Initial Redis PING failed, continuing: {}", e);
        }

        info!("Redis pool initialized");
        Ok(pool)
    }

    pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

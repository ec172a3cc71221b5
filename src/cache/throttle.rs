//! Identical-request throttle.
//!
//! A request is keyed by scope, merchant and a set of request fields; a second
//! request with the same key inside the window is refused.

use crate::cache::error::CacheResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Scope used by the POS status endpoint
pub const TRANSACTION_STATUS_SCOPE: &str = "transaction_status";

/// `throttle_generic_<scope>_<sha256(merchant|field|...)[:32]>`, or `None`
/// when every field is blank (such requests are not throttled).
pub fn throttle_key(scope: &str, merchant_id: i64, fields: &[Option<&str>]) -> Option<String> {
    let values: Vec<&str> = fields.iter().map(|f| f.unwrap_or("")).collect();
    if values.iter().all(|v| v.trim().is_empty()) {
        return None;
    }

    let merchant = merchant_id.to_string();
    let identifier = std::iter::once(merchant.as_str())
        .chain(values.iter().copied())
        .collect::<Vec<_>>()
        .join("|");
    let digest = hex::encode(Sha256::digest(identifier.as_bytes()));

    Some(format!("throttle_generic_{}_{}", scope, &digest[..32]))
}

#[async_trait]
pub trait RequestThrottle: Send + Sync {
    /// Record the request; `false` when the same key was seen inside `window`.
    async fn allow(&self, key: &str, window: Duration) -> CacheResult<bool>;
}

/// Process-local throttle for single-instance runs and tests
#[derive(Default)]
pub struct MemoryThrottle {
    seen: Mutex<HashMap<String, Instant>>,
}

impl MemoryThrottle {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestThrottle for MemoryThrottle {
    async fn allow(&self, key: &str, window: Duration) -> CacheResult<bool> {
        let mut seen = self.seen.lock().await;
        let now = Instant::now();
        seen.retain(|_, at| now.duration_since(*at) < window);

        if seen.contains_key(key) {
            return Ok(false);
        }
        seen.insert(key.to_string(), now);
        Ok(true)
    }
}

#[cfg(feature = "cache")]
pub use redis_throttle::RedisThrottle;

#[cfg(feature = "cache")]
mod redis_throttle {
    use super::RequestThrottle;
    use crate::cache::error::CacheResult;
    use crate::cache::RedisPool;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Shared throttle: `SET key <ts> NX EX <window>` succeeds only for the
    /// first request in the window.
    #[derive(Clone)]
    pub struct RedisThrottle {
        pool: RedisPool,
    }

    impl RedisThrottle {
        pub fn new(pool: RedisPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl RequestThrottle for RedisThrottle {
        async fn allow(&self, key: &str, window: Duration) -> CacheResult<bool> {
            let mut conn = self.pool.get().await?;
            let set: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(chrono::Utc::now().timestamp())
                .arg("NX")
                .arg("EX")
                .arg(window.as_secs().max(1))
                .query_async(&mut *conn)
                .await?;
            Ok(set.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = throttle_key(TRANSACTION_STATUS_SCOPE, 111, &[Some("dev-1"), None]).unwrap();
        assert!(key.starts_with("throttle_generic_transaction_status_"));
        assert_eq!(key.len(), "throttle_generic_transaction_status_".len() + 32);

        let expected = hex::encode(Sha256::digest(b"111|dev-1|"));
        assert!(key.ends_with(&expected[..32]));
    }

    #[test]
    fn test_key_depends_on_merchant_and_fields() {
        let a = throttle_key("s", 111, &[Some("x"), None]);
        let b = throttle_key("s", 222, &[Some("x"), None]);
        let c = throttle_key("s", 111, &[None, Some("x")]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(throttle_key("s", 111, &[None, Some("  ")]).is_none());
    }

    #[tokio::test]
    async fn test_memory_throttle_window() {
        let throttle = MemoryThrottle::new();
        let window = Duration::from_millis(50);

        assert!(throttle.allow("k", window).await.unwrap());
        assert!(!throttle.allow("k", window).await.unwrap());
        assert!(throttle.allow("other", window).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(throttle.allow("k", window).await.unwrap());
    }
}

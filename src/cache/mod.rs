pub mod keys;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const TTL_JITTER_RATIO: f64 = 0.1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Raw key-value store with per-entry TTL. Last write wins; no cross-key
/// atomicity is assumed.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(connection))
    }

    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    pub async fn is_connected(&self) -> bool {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

#[async_trait]
impl KvStore for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await?;
        } else {
            let ttl_secs = apply_ttl_jitter(ttl).as_secs().max(1);
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        }
        Ok(())
    }
}

/// Process-local store used when no Redis is configured, and in tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((_, Some(deadline))) => Instant::now() >= *deadline,
            Some((_, None)) => false,
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let deadline = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.lock().insert(key.to_string(), (value, deadline));
        Ok(())
    }
}

/// Typed, versioned view over a [`KvStore`]. Every failure is logged and
/// reported as a miss so the pipeline can move on to the next tier.
#[derive(Clone)]
pub struct EdgeCache {
    store: Arc<dyn KvStore>,
    version: String,
}

impl EdgeCache {
    pub fn new(store: Arc<dyn KvStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let payload = match self.store.get_raw(key).await {
            Ok(payload) => payload?,
            Err(err) => {
                tracing::warn!(%key, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(%key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize,
    {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(%key, error = %err, "cache value not serializable");
                return;
            }
        };
        if let Err(err) = self.store.put_raw(key, payload, ttl).await {
            tracing::warn!(%key, error = %err, "cache write failed");
        }
    }

    pub fn translation_key(&self, from: &str, to: &str, text: &str) -> String {
        keys::translation_key(&self.version, from, to, text)
    }

    pub fn etymology_key(&self, lang: &str, word: &str) -> String {
        keys::etymology_key(&self.version, lang, word)
    }
}

fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    let jittered_ms = (base_ms * factor).round().max(1.0);
    Duration::from_millis(jittered_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = EdgeCache::new(Arc::new(MemoryCache::new()), "v1");
        cache.put("k", &vec![1, 2, 3], Duration::from_secs(60)).await;
        let value: Option<Vec<i32>> = cache.get("k").await;
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let store = MemoryCache::new();
        store
            .put_raw("k", "1".to_string(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get_raw("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let store = Arc::new(MemoryCache::new());
        store
            .put_raw("k", "not json".to_string(), Duration::ZERO)
            .await
            .unwrap();
        let cache = EdgeCache::new(store, "v1");
        let value: Option<Vec<i32>> = cache.get("k").await;
        assert!(value.is_none());
    }

    #[test]
    fn jitter_stays_within_ratio() {
        for _ in 0..100 {
            let ttl = apply_ttl_jitter(Duration::from_secs(100));
            assert!(ttl >= Duration::from_secs(90) && ttl <= Duration::from_secs(110));
        }
    }
}

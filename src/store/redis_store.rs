use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{LedgerStore, StoreError, SyncRecord};
use crate::services::learning::{LearnedWord, LearningConfig};

const RELEASE_SCRIPT: &str = r#"
  if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
  else
    return 0
  end
"#;

/// Ledger persisted in Redis under `{prefix}:…`. Pending words live in a
/// sorted set scored by first-enqueue time; the processing guard is
/// `SET NX PX` owned by this instance's token.
#[derive(Clone)]
pub struct RedisLedgerStore {
    connection: MultiplexedConnection,
    prefix: String,
    instance_id: String,
}

impl RedisLedgerStore {
    pub fn new(connection: MultiplexedConnection, prefix: impl Into<String>) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn word_key(&self, word: &str) -> String {
        format!("{}:word:{}", self.prefix, word)
    }

    fn pending_key(&self) -> String {
        format!("{}:pending", self.prefix)
    }

    fn stats_key(&self) -> String {
        format!("{}:stats", self.prefix)
    }

    fn config_key(&self) -> String {
        format!("{}:config", self.prefix)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.prefix)
    }
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn load_word(&self, word: &str) -> Result<Option<LearnedWord>, StoreError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.get(self.word_key(word)).await?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn load_words(&self, words: &[String]) -> Result<Vec<LearnedWord>, StoreError> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = words.iter().map(|w| self.word_key(w)).collect();
        let mut conn = self.connection.clone();
        let payloads: Vec<Option<String>> = conn.mget(&keys).await?;

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            match serde_json::from_str::<LearnedWord>(&payload) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(error = %err, "skipping undecodable learned word"),
            }
        }
        Ok(records)
    }

    async fn save_word(&self, record: &LearnedWord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(self.word_key(&record.word), payload).await?;
        Ok(())
    }

    async fn enqueue_pending(&self, word: &str) -> Result<usize, StoreError> {
        let key = self.pending_key();
        let mut conn = self.connection.clone();
        let (len,): (usize,) = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg("NX")
            .arg(Utc::now().timestamp_millis())
            .arg(word)
            .ignore()
            .cmd("ZCARD")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn pending(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.zrange(self.pending_key(), 0, -1).await?)
    }

    async fn pending_len(&self) -> Result<usize, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.zcard(self.pending_key()).await?)
    }

    async fn remove_pending(&self, words: &[String]) -> Result<(), StoreError> {
        if words.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.zrem::<_, _, ()>(self.pending_key(), words).await?;
        Ok(())
    }

    async fn load_stats(&self) -> Result<SyncRecord, StoreError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.stats_key()).await?;

        Ok(SyncRecord {
            total_learned: parse_field(&fields, "totalLearned").unwrap_or(0),
            pending_count: parse_field(&fields, "pendingCount").unwrap_or(0),
            last_sync_to_repo: fields
                .get("lastSyncToRepo")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            last_pr_number: parse_field(&fields, "lastPRNumber"),
        })
    }

    async fn bump_total_learned(&self, by: u64) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.hincr(self.stats_key(), "totalLearned", by).await?)
    }

    async fn record_pending_count(&self, count: usize) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(self.stats_key(), "pendingCount", count)
            .await?;
        Ok(())
    }

    async fn record_sync(&self, at: DateTime<Utc>, pr_number: u64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.hset_multiple::<_, _, _, ()>(
            self.stats_key(),
            &[
                ("lastSyncToRepo", at.to_rfc3339()),
                ("lastPRNumber", pr_number.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn load_config(&self) -> Result<Option<LearningConfig>, StoreError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.get(self.config_key()).await?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn save_config(&self, config: &LearningConfig) -> Result<(), StoreError> {
        let payload = serde_json::to_string(config)?;
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(self.config_key(), payload).await?;
        Ok(())
    }

    async fn try_acquire_processing(&self, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let result: Option<String> = redis::cmd("SET")
            .arg(self.processing_key())
            .arg(&self.instance_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn release_processing(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.processing_key())
            .arg(&self.instance_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_processing(&self) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.exists(self.processing_key()).await?)
    }
}

fn parse_field<T: std::str::FromStr>(fields: &HashMap<String, String>, name: &str) -> Option<T> {
    fields.get(name).and_then(|v| v.parse().ok())
}

//! Shared ledger state behind a narrow async interface.
//!
//! Consistency contract: every method is a single-key operation with
//! last-write-wins semantics, except [`LedgerStore::try_acquire_processing`],
//! which is an atomic compare-and-set. Word records, the pending set and the
//! stats counters are written independently; the pending set and the word
//! records are authoritative, stats are an approximation for display and
//! threshold checks.

mod redis_store;

pub use self::redis_store::RedisLedgerStore;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::learning::{LearnedWord, LearningConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Counters kept next to the ledger. `isProcessing` is not stored here; it is
/// read from the processing guard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub total_learned: u64,
    pub pending_count: usize,
    pub last_sync_to_repo: Option<DateTime<Utc>>,
    #[serde(rename = "lastPRNumber")]
    pub last_pr_number: Option<u64>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_word(&self, word: &str) -> Result<Option<LearnedWord>, StoreError>;
    async fn load_words(&self, words: &[String]) -> Result<Vec<LearnedWord>, StoreError>;
    async fn save_word(&self, record: &LearnedWord) -> Result<(), StoreError>;

    /// Set semantics: re-adding a member is a no-op. Returns the set size.
    async fn enqueue_pending(&self, word: &str) -> Result<usize, StoreError>;
    /// Members in first-enqueued order.
    async fn pending(&self) -> Result<Vec<String>, StoreError>;
    async fn pending_len(&self) -> Result<usize, StoreError>;
    async fn remove_pending(&self, words: &[String]) -> Result<(), StoreError>;

    async fn load_stats(&self) -> Result<SyncRecord, StoreError>;
    async fn bump_total_learned(&self, by: u64) -> Result<u64, StoreError>;
    async fn record_pending_count(&self, count: usize) -> Result<(), StoreError>;
    async fn record_sync(&self, at: DateTime<Utc>, pr_number: u64) -> Result<(), StoreError>;

    async fn load_config(&self) -> Result<Option<LearningConfig>, StoreError>;
    async fn save_config(&self, config: &LearningConfig) -> Result<(), StoreError>;

    /// Atomically flips the processing guard from free to held. `ttl` bounds
    /// how long a crashed holder can keep it.
    async fn try_acquire_processing(&self, ttl: Duration) -> Result<bool, StoreError>;
    async fn release_processing(&self) -> Result<(), StoreError>;
    async fn is_processing(&self) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct MemoryLedger {
    words: HashMap<String, LearnedWord>,
    pending: Vec<String>,
    pending_set: HashSet<String>,
    stats: SyncRecord,
    config: Option<LearningConfig>,
}

/// Single-process ledger. The guard is an `AtomicBool` CAS and has no expiry.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryLedger>,
    processing: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_word(&self, word: &str) -> Result<Option<LearnedWord>, StoreError> {
        Ok(self.inner.lock().words.get(word).cloned())
    }

    async fn load_words(&self, words: &[String]) -> Result<Vec<LearnedWord>, StoreError> {
        let inner = self.inner.lock();
        Ok(words.iter().filter_map(|w| inner.words.get(w).cloned()).collect())
    }

    async fn save_word(&self, record: &LearnedWord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .words
            .insert(record.word.clone(), record.clone());
        Ok(())
    }

    async fn enqueue_pending(&self, word: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        if inner.pending_set.insert(word.to_string()) {
            inner.pending.push(word.to_string());
        }
        Ok(inner.pending.len())
    }

    async fn pending(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().pending.clone())
    }

    async fn pending_len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().pending.len())
    }

    async fn remove_pending(&self, words: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let MemoryLedger {
            pending,
            pending_set,
            ..
        } = &mut *inner;
        for word in words {
            pending_set.remove(word);
        }
        pending.retain(|w| pending_set.contains(w));
        Ok(())
    }

    async fn load_stats(&self) -> Result<SyncRecord, StoreError> {
        Ok(self.inner.lock().stats.clone())
    }

    async fn bump_total_learned(&self, by: u64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.stats.total_learned += by;
        Ok(inner.stats.total_learned)
    }

    async fn record_pending_count(&self, count: usize) -> Result<(), StoreError> {
        self.inner.lock().stats.pending_count = count;
        Ok(())
    }

    async fn record_sync(&self, at: DateTime<Utc>, pr_number: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.stats.last_sync_to_repo = Some(at);
        inner.stats.last_pr_number = Some(pr_number);
        Ok(())
    }

    async fn load_config(&self) -> Result<Option<LearningConfig>, StoreError> {
        Ok(self.inner.lock().config.clone())
    }

    async fn save_config(&self, config: &LearningConfig) -> Result<(), StoreError> {
        self.inner.lock().config = Some(config.clone());
        Ok(())
    }

    async fn try_acquire_processing(&self, _ttl: Duration) -> Result<bool, StoreError> {
        Ok(self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    async fn release_processing(&self) -> Result<(), StoreError> {
        self.processing.store(false, Ordering::Release);
        Ok(())
    }

    async fn is_processing(&self) -> Result<bool, StoreError> {
        Ok(self.processing.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn pending_set_deduplicates_and_keeps_order() {
        let store = MemoryLedgerStore::new();
        assert_eq!(store.enqueue_pending("casa").await.unwrap(), 1);
        assert_eq!(store.enqueue_pending("perro").await.unwrap(), 2);
        assert_eq!(store.enqueue_pending("casa").await.unwrap(), 2);
        assert_eq!(store.pending().await.unwrap(), vec!["casa", "perro"]);

        store.remove_pending(&["casa".to_string()]).await.unwrap();
        assert_eq!(store.pending().await.unwrap(), vec!["perro"]);
    }

    #[tokio::test]
    async fn processing_guard_is_exclusive() {
        let store = Arc::new(MemoryLedgerStore::new());
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .try_acquire_processing(Duration::from_secs(60))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut acquired = 0;
        for handle in attempts {
            if handle.await.unwrap() {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
        assert!(store.is_processing().await.unwrap());

        store.release_processing().await.unwrap();
        assert!(!store.is_processing().await.unwrap());
        assert!(store
            .try_acquire_processing(Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stats_counters_accumulate() {
        let store = MemoryLedgerStore::new();
        store.bump_total_learned(2).await.unwrap();
        assert_eq!(store.bump_total_learned(3).await.unwrap(), 5);
        store.record_sync(Utc::now(), 42).await.unwrap();
        let stats = store.load_stats().await.unwrap();
        assert_eq!(stats.total_learned, 5);
        assert_eq!(stats.last_pr_number, Some(42));
    }
}

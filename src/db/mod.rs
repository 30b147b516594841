//! Relational dictionary tier: a larger word set than the embedded lexicon,
//! queried per word, in batches, by prefix, or for aggregate stats.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::lexicon::{normalize_word, DictionaryEntry, EtymologyData};

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryStats {
    pub total_words: i64,
    pub with_etymology: i64,
    pub translations_by_language: BTreeMap<String, i64>,
}

#[async_trait]
pub trait DictionaryRepository: Send + Sync {
    async fn find_word(&self, word: &str) -> Result<Option<DictionaryEntry>, RepositoryError>;

    /// Concurrent fan-out over [`find_word`](Self::find_word); one failed
    /// lookup only drops that word.
    async fn find_words(&self, words: &[String]) -> HashMap<String, DictionaryEntry> {
        let lookups = words.iter().map(|word| async move {
            match self.find_word(word).await {
                Ok(entry) => entry.map(|e| (normalize_word(word), e)),
                Err(err) => {
                    tracing::warn!(%word, error = %err, "dictionary lookup failed");
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// Words starting with `prefix`, most frequent first.
    async fn search(&self, prefix: &str, limit: i64) -> Result<Vec<String>, RepositoryError>;

    async fn stats(&self) -> Result<DictionaryStats, RepositoryError>;

    async fn upsert_word(&self, word: &str, entry: &DictionaryEntry) -> Result<(), RepositoryError>;
}

pub fn clamp_search_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT)
}

#[derive(Clone)]
pub struct PgDictionary {
    pool: PgPool,
}

impl PgDictionary {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        let repo = Self::new(pool);
        repo.ensure_schema().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "dictionary_words" (
                "word" TEXT PRIMARY KEY,
                "translations" JSONB NOT NULL DEFAULT '{}'::jsonb,
                "etymology" JSONB,
                "pos" TEXT,
                "frequency" INTEGER,
                "variants" TEXT[],
                "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DictionaryRepository for PgDictionary {
    async fn find_word(&self, word: &str) -> Result<Option<DictionaryEntry>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT "translations", "etymology", "pos", "frequency", "variants"
               FROM "dictionary_words" WHERE "word" = $1"#,
        )
        .bind(normalize_word(word))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let translations: Json<BTreeMap<String, String>> = row.try_get("translations")?;
        let etymology: Option<Json<EtymologyData>> = row.try_get("etymology")?;
        let frequency: Option<i32> = row.try_get("frequency")?;

        Ok(Some(DictionaryEntry {
            translations: translations.0,
            etymology: etymology.map(|e| e.0),
            pos: row.try_get("pos")?,
            frequency: frequency.and_then(|f| u32::try_from(f).ok()),
            variants: row.try_get("variants")?,
        }))
    }

    async fn search(&self, prefix: &str, limit: i64) -> Result<Vec<String>, RepositoryError> {
        let pattern = format!("{}%", escape_like(&normalize_word(prefix)));
        let words: Vec<String> = sqlx::query_scalar(
            r#"SELECT "word" FROM "dictionary_words"
               WHERE "word" LIKE $1 ESCAPE '\'
               ORDER BY "frequency" ASC NULLS LAST, "word" ASC
               LIMIT $2"#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(words)
    }

    async fn stats(&self) -> Result<DictionaryStats, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS total,
                      COUNT("etymology") AS with_etymology
               FROM "dictionary_words""#,
        )
        .fetch_one(&self.pool)
        .await?;

        let lang_rows = sqlx::query(
            r#"SELECT key AS lang, COUNT(*) AS cnt
               FROM "dictionary_words", jsonb_object_keys("translations") AS key
               GROUP BY key"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut translations_by_language = BTreeMap::new();
        for r in lang_rows {
            let lang: String = r.try_get("lang")?;
            let cnt: i64 = r.try_get("cnt")?;
            translations_by_language.insert(lang, cnt);
        }

        Ok(DictionaryStats {
            total_words: row.try_get("total")?,
            with_etymology: row.try_get("with_etymology")?,
            translations_by_language,
        })
    }

    async fn upsert_word(&self, word: &str, entry: &DictionaryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO "dictionary_words" ("word", "translations", "etymology", "pos", "frequency", "variants")
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT ("word") DO UPDATE SET
                   "translations" = EXCLUDED."translations",
                   "etymology" = EXCLUDED."etymology",
                   "pos" = EXCLUDED."pos",
                   "frequency" = EXCLUDED."frequency",
                   "variants" = EXCLUDED."variants",
                   "updatedAt" = NOW()"#,
        )
        .bind(normalize_word(word))
        .bind(Json(&entry.translations))
        .bind(entry.etymology.as_ref().map(Json))
        .bind(entry.pos.as_deref())
        .bind(entry.frequency.and_then(|f| i32::try_from(f).ok()))
        .bind(entry.variants.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-process repository for database-less runs and tests.
#[derive(Default)]
pub struct MemoryDictionary {
    entries: RwLock<HashMap<String, DictionaryEntry>>,
}

impl MemoryDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, DictionaryEntry)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(word, entry)| (normalize_word(&word), entry))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }
}

#[async_trait]
impl DictionaryRepository for MemoryDictionary {
    async fn find_word(&self, word: &str) -> Result<Option<DictionaryEntry>, RepositoryError> {
        Ok(self.entries.read().get(&normalize_word(word)).cloned())
    }

    async fn search(&self, prefix: &str, limit: i64) -> Result<Vec<String>, RepositoryError> {
        let prefix = normalize_word(prefix);
        let entries = self.entries.read();
        let mut hits: Vec<(&String, Option<u32>)> = entries
            .iter()
            .filter(|(word, _)| word.starts_with(&prefix))
            .map(|(word, entry)| (word, entry.frequency))
            .collect();
        hits.sort_by(|a, b| {
            a.1.unwrap_or(u32::MAX)
                .cmp(&b.1.unwrap_or(u32::MAX))
                .then_with(|| a.0.cmp(b.0))
        });
        Ok(hits
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(word, _)| word.clone())
            .collect())
    }

    async fn stats(&self) -> Result<DictionaryStats, RepositoryError> {
        let entries = self.entries.read();
        let mut stats = DictionaryStats {
            total_words: entries.len() as i64,
            ..DictionaryStats::default()
        };
        for entry in entries.values() {
            if entry.etymology.is_some() {
                stats.with_etymology += 1;
            }
            for lang in entry.translations.keys() {
                *stats.translations_by_language.entry(lang.clone()).or_insert(0) += 1;
            }
        }
        Ok(stats)
    }

    async fn upsert_word(&self, word: &str, entry: &DictionaryEntry) -> Result<(), RepositoryError> {
        self.entries.write().insert(normalize_word(word), entry.clone());
        Ok(())
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

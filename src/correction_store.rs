// src/correction_store.rs
//
// Persistent knowledge base of incorrect -> correct term mappings. Backed
// by SQLite via sqlx; one row per incorrect term, overwritten on conflict.
// The store is the sole source of truth between runs; there is no
// in-memory cache. Read paths degrade to "no corrections" on failure so a
// broken database never takes the pipeline down with it.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Provenance tag for corrections found by the fuzzy analyzer.
pub const SOURCE_LLM_IDENTIFIED: &str = "llm_identified";
/// Provenance tag for manually seeded corrections.
pub const SOURCE_MANUAL: &str = "manual";

/// How long a writer waits on a contended database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not create database directory {0}: {1}")]
    CreateDir(String, std::io::Error),
}

/// Category of a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CorrectionType {
    Term,
    Person,
    Acronym,
}

impl CorrectionType {
    /// Parse a tag as produced by the analyzer; unknown tags map to None.
    pub fn parse(value: &str) -> Option<CorrectionType> {
        match value.trim().to_lowercase().as_str() {
            "term" => Some(CorrectionType::Term),
            "person" => Some(CorrectionType::Person),
            "acronym" => Some(CorrectionType::Acronym),
            _ => None,
        }
    }
}

/// A persisted correction with full metadata.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CorrectionRecord {
    pub incorrect_term: String,
    pub correct_term: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub correction_type: CorrectionType,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A correction about to be persisted; timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCorrection {
    pub incorrect_term: String,
    pub correct_term: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub correction_type: CorrectionType,
    pub source: String,
}

impl NewCorrection {
    /// A manually curated correction: full confidence, manual provenance.
    pub fn manual(incorrect_term: &str, correct_term: &str) -> Self {
        Self {
            incorrect_term: incorrect_term.to_string(),
            correct_term: correct_term.to_string(),
            confidence: 1.0,
            reasoning: None,
            correction_type: CorrectionType::Term,
            source: SOURCE_MANUAL.to_string(),
        }
    }
}

/// Handle to the corrections database. Cheap to clone (the pool is shared);
/// constructed explicitly and injected wherever corrections are needed.
#[derive(Clone)]
pub struct CorrectionStore {
    pool: SqlitePool,
}

impl CorrectionStore {
    /// Open (and create if missing) the corrections database at `path`.
    pub async fn connect(path: &Path) -> Result<CorrectionStore, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::CreateDir(parent.display().to_string(), e))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        let store = CorrectionStore { pool };
        store.init_schema().await?;
        info!("[CorrectionStore] Connected to {}", path.display());
        Ok(store)
    }

    /// Wrap an existing pool. Used by tests and by callers that manage
    /// their own connection lifecycle.
    pub async fn from_pool(pool: SqlitePool) -> Result<CorrectionStore, StoreError> {
        let store = CorrectionStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// An in-memory store: corrections apply for this process only. The
    /// fallback when the on-disk database cannot be opened.
    pub async fn in_memory() -> Result<CorrectionStore, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        // A fresh connection means a fresh in-memory database, so the pool
        // must hold exactly one connection for the lifetime of the store
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS term_corrections (
                incorrect_term TEXT PRIMARY KEY,
                correct_term TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 1.0,
                reasoning TEXT,
                correction_type TEXT NOT NULL DEFAULT 'term',
                source TEXT NOT NULL DEFAULT 'llm_identified',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_term_corrections_confidence
             ON term_corrections (confidence)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a correction or overwrite the existing row for the same
    /// incorrect term. The replacement covers correct_term, confidence,
    /// reasoning, correction_type and source; created_at is preserved and
    /// updated_at is refreshed. Last writer wins under concurrency.
    pub async fn upsert(&self, correction: &NewCorrection) -> Result<(), StoreError> {
        if correction.incorrect_term.trim().is_empty() || correction.correct_term.trim().is_empty() {
            warn!("[CorrectionStore] Skipping empty correction pair");
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO term_corrections
                (incorrect_term, correct_term, confidence, reasoning, correction_type, source, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(incorrect_term) DO UPDATE SET
                correct_term = excluded.correct_term,
                confidence = excluded.confidence,
                reasoning = excluded.reasoning,
                correction_type = excluded.correction_type,
                source = excluded.source,
                updated_at = excluded.updated_at",
        )
        .bind(&correction.incorrect_term)
        .bind(&correction.correct_term)
        .bind(correction.confidence)
        .bind(&correction.reasoning)
        .bind(correction.correction_type)
        .bind(&correction.source)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a batch of corrections, best effort: a failed record is
    /// logged and skipped, the rest still commit. Returns how many were
    /// actually saved.
    pub async fn upsert_many(&self, corrections: &[NewCorrection]) -> usize {
        let mut saved = 0usize;
        for correction in corrections {
            match self.upsert(correction).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    error!(
                        "[CorrectionStore] Failed to save '{}' -> '{}': {}",
                        correction.incorrect_term, correction.correct_term, e
                    );
                }
            }
        }
        if saved > 0 {
            info!("[CorrectionStore] Saved {} of {} corrections", saved, corrections.len());
        }
        saved
    }

    /// Fetch corrections at or above `min_confidence` (optionally limited
    /// to the given types) as (incorrect, correct) pairs ordered by
    /// descending key length, ready for longest-match-first application.
    ///
    /// A store failure is logged and yields an empty mapping; callers
    /// treat that as "no corrections available", never as fatal.
    pub async fn query(
        &self,
        min_confidence: f64,
        types: Option<&[CorrectionType]>,
    ) -> Vec<(String, String)> {
        if let Some(types) = types {
            if types.is_empty() {
                return Vec::new();
            }
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT incorrect_term, correct_term FROM term_corrections WHERE confidence >= ",
        );
        qb.push_bind(min_confidence);
        push_type_filter(&mut qb, types);
        qb.push(" ORDER BY length(incorrect_term) DESC");

        match qb.build_query_as::<(String, String)>().fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[CorrectionStore] Query failed, treating as no corrections: {}", e);
                Vec::new()
            }
        }
    }

    /// Same filter as [`query`] but with full metadata per record.
    pub async fn query_detailed(
        &self,
        min_confidence: f64,
        types: Option<&[CorrectionType]>,
    ) -> Vec<CorrectionRecord> {
        if let Some(types) = types {
            if types.is_empty() {
                return Vec::new();
            }
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM term_corrections WHERE confidence >= ");
        qb.push_bind(min_confidence);
        push_type_filter(&mut qb, types);
        qb.push(" ORDER BY length(incorrect_term) DESC");

        match qb.build_query_as::<CorrectionRecord>().fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[CorrectionStore] Detailed query failed, treating as no corrections: {}", e);
                Vec::new()
            }
        }
    }
}

fn push_type_filter(qb: &mut QueryBuilder<Sqlite>, types: Option<&[CorrectionType]>) {
    if let Some(types) = types {
        qb.push(" AND correction_type IN (");
        let mut separated = qb.separated(", ");
        for t in types {
            separated.push_bind(*t);
        }
        qb.push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (CorrectionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CorrectionStore::connect(&dir.path().join("corrections.sqlite3"))
            .await
            .unwrap();
        (store, dir)
    }

    fn correction(incorrect: &str, correct: &str, confidence: f64) -> NewCorrection {
        NewCorrection {
            incorrect_term: incorrect.to_string(),
            correct_term: correct.to_string(),
            confidence,
            reasoning: Some("test".to_string()),
            correction_type: CorrectionType::Term,
            source: SOURCE_LLM_IDENTIFIED.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_never_duplicates() {
        let (store, _dir) = test_store().await;

        store.upsert(&correction("jupitor", "Jupiter", 0.8)).await.unwrap();
        let first = store.query_detailed(0.0, None).await;
        assert_eq!(first.len(), 1);
        let first_created = first[0].created_at;
        let first_updated = first[0].updated_at;

        // Timestamps are bound with sub-second precision; a short pause
        // guarantees the second upsert lands strictly later.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut replacement = correction("jupitor", "JUPITER CORRECTED", 0.95);
        replacement.source = SOURCE_MANUAL.to_string();
        replacement.correction_type = CorrectionType::Acronym;
        store.upsert(&replacement).await.unwrap();

        let rows = store.query_detailed(0.0, None).await;
        assert_eq!(rows.len(), 1, "re-insertion must not create a duplicate");
        let row = &rows[0];
        assert_eq!(row.correct_term, "JUPITER CORRECTED");
        assert_eq!(row.confidence, 0.95);
        assert_eq!(row.source, SOURCE_MANUAL);
        assert_eq!(row.correction_type, CorrectionType::Acronym);
        assert_eq!(row.created_at, first_created);
        assert!(row.updated_at > first_updated, "updated_at must strictly increase");
    }

    #[tokio::test]
    async fn test_query_filters_by_confidence() {
        let (store, _dir) = test_store().await;
        store.upsert(&correction("jupe", "JUP", 0.9)).await.unwrap();
        store.upsert(&correction("perp", "Perps", 0.65)).await.unwrap();
        store.upsert(&correction("decca", "DCA", 0.3)).await.unwrap();

        let high = store.query(0.75, None).await;
        assert_eq!(high, vec![("jupe".to_string(), "JUP".to_string())]);

        let medium_and_up = store.query(0.6, None).await;
        assert_eq!(medium_and_up.len(), 2);

        let all = store.query(0.0, None).await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_query_orders_longest_first() {
        let (store, _dir) = test_store().await;
        store.upsert(&correction("perp", "Perps", 1.0)).await.unwrap();
        store.upsert(&correction("perp dex", "Perps DEX", 1.0)).await.unwrap();
        store.upsert(&correction("p", "P", 1.0)).await.unwrap();

        let mapping = store.query(0.0, None).await;
        let keys: Vec<&str> = mapping.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["perp dex", "perp", "p"]);
    }

    #[tokio::test]
    async fn test_query_filters_by_type() {
        let (store, _dir) = test_store().await;
        let mut person = correction("meow", "Meow", 0.9);
        person.correction_type = CorrectionType::Person;
        store.upsert(&person).await.unwrap();
        store.upsert(&correction("jupe", "JUP", 0.9)).await.unwrap();

        let people = store.query(0.0, Some(&[CorrectionType::Person])).await;
        assert_eq!(people, vec![("meow".to_string(), "Meow".to_string())]);

        let both = store
            .query(0.0, Some(&[CorrectionType::Person, CorrectionType::Term]))
            .await;
        assert_eq!(both.len(), 2);

        // An explicitly empty type list matches nothing
        assert!(store.query(0.0, Some(&[])).await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_many_best_effort() {
        let (store, _dir) = test_store().await;
        let batch = vec![
            correction("jupe", "JUP", 0.9),
            correction("", "ignored", 0.9), // skipped, not fatal
            correction("dow", "DAO", 0.8),
        ];
        let saved = store.upsert_many(&batch).await;
        // The empty pair is skipped inside upsert (Ok), so all calls succeed
        assert_eq!(saved, 3);
        assert_eq!(store.query(0.0, None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_pair_not_persisted() {
        let (store, _dir) = test_store().await;
        store.upsert(&correction("", "x", 1.0)).await.unwrap();
        store.upsert(&correction("x", "  ", 1.0)).await.unwrap();
        assert!(store.query(0.0, None).await.is_empty());
    }
}

//! Explanation cache: keyed by board layout plus move.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use chess_core::fen::board_field;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AnalysisError;

/// `<board field>|<move>`. Side to move, castling rights, en passant square
/// and clocks do not take part in the key.
pub fn cache_key(fen: &str, move_notation: &str) -> String {
    format!("{}|{}", board_field(fen), move_notation)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub fen: String,
    pub move_notation: String,
    pub explanation: String,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fen: &str, move_notation: &str, explanation: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key(fen, move_notation),
            fen: fen.to_string(),
            move_notation: move_notation.to_string(),
            explanation: explanation.into(),
            updated_at: Utc::now(),
        }
    }
}

pub trait ExplanationCache: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AnalysisError>> + Send;

    /// Insert or overwrite; concurrent writers resolve last-write-wins.
    fn upsert(&self, entry: CacheEntry) -> impl Future<Output = Result<(), AnalysisError>> + Send;
}

/// Postgres-backed cache (`move_explanations`).
#[derive(Clone)]
pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ExplanationCache for PgCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AnalysisError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT explanation FROM move_explanations WHERE cache_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AnalysisError::CacheUnavailable(e.to_string()))?;
        Ok(row.map(|(explanation,)| explanation))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), AnalysisError> {
        sqlx::query(
            r#"INSERT INTO move_explanations (cache_key, fen, move_notation, explanation, updated_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (cache_key) DO UPDATE SET
                   fen = EXCLUDED.fen,
                   move_notation = EXCLUDED.move_notation,
                   explanation = EXCLUDED.explanation,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.fen)
        .bind(&entry.move_notation)
        .bind(&entry.explanation)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AnalysisError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Process-local cache, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExplanationCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AnalysisError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AnalysisError::CacheUnavailable("memory cache poisoned".into()))?;
        Ok(entries.get(key).map(|e| e.explanation.clone()))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), AnalysisError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AnalysisError::CacheUnavailable("memory cache poisoned".into()))?;
        entries.insert(entry.cache_key.clone(), entry);
        Ok(())
    }
}

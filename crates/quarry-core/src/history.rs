//! Query history persistence using SQLite.
//!
//! Retrieval statistics land here for later inspection. Recording is
//! invoked fire-and-forget by the retriever; nothing in this module is on
//! the query's critical path.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuarryError, QuarryResult};
use crate::traits::{QueryHistorySink, QueryRecord};

/// Aggregate statistics over recorded queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Total number of recorded retrievals.
    pub total_queries: u64,
    /// Most frequent query texts with their counts, descending.
    pub popular_queries: Vec<(String, u64)>,
}

/// One persisted history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Row id.
    pub id: String,
    /// The query as issued.
    pub query_text: String,
    /// Categories the query was restricted to, if any.
    pub categories: Option<Vec<String>>,
    /// Number of candidates returned.
    pub result_count: usize,
    /// Retrieval wall-clock time in milliseconds.
    pub retrieval_ms: u64,
    /// Returned chunk ids, in rank order.
    pub chunk_ids: Vec<String>,
    /// Whether the result was degraded to a single stage.
    pub degraded: bool,
    /// When the query ran.
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed [`QueryHistorySink`].
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) a history database.
    ///
    /// Pass `":memory:"` for an in-memory store.
    pub fn new(db_path: impl AsRef<Path>) -> QuarryResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = if db_path.as_ref().to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path.as_ref())
        }?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_table()?;
        Ok(store)
    }

    fn create_table(&self) -> QuarryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS query_history (
                id            TEXT PRIMARY KEY,
                query_text    TEXT NOT NULL,
                categories    TEXT,
                result_count  INTEGER NOT NULL,
                retrieval_ms  INTEGER NOT NULL,
                chunk_ids     TEXT NOT NULL,
                degraded      INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_history_created_at
             ON query_history(created_at)",
            [],
        )?;
        Ok(())
    }

    /// The most recent rows, newest first.
    pub fn recent(&self, limit: usize) -> QuarryResult<Vec<HistoryRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, query_text, categories, result_count, retrieval_ms,
                    chunk_ids, degraded, created_at
             FROM query_history
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, query_text, categories, result_count, retrieval_ms, chunk_ids, degraded, created_at) =
                row?;
            let categories = match categories {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };
            let chunk_ids: Vec<String> = serde_json::from_str(&chunk_ids)?;
            let created_at = created_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| QuarryError::database(format!("bad created_at: {e}")))?;
            out.push(HistoryRow {
                id,
                query_text,
                categories,
                result_count: result_count as usize,
                retrieval_ms: retrieval_ms as u64,
                chunk_ids,
                degraded,
                created_at,
            });
        }
        Ok(out)
    }

    /// Totals and most frequent query texts.
    pub fn stats(&self) -> QuarryResult<HistoryStats> {
        let conn = self.lock()?;
        let total_queries: u64 =
            conn.query_row("SELECT COUNT(*) FROM query_history", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT query_text, COUNT(*) AS n
             FROM query_history
             GROUP BY query_text
             ORDER BY n DESC, query_text ASC
             LIMIT 10",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut popular_queries = Vec::new();
        for row in rows {
            popular_queries.push(row?);
        }

        Ok(HistoryStats {
            total_queries,
            popular_queries,
        })
    }

    fn lock(&self) -> QuarryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuarryError::database("history store lock poisoned"))
    }
}

#[async_trait]
impl QueryHistorySink for SqliteHistoryStore {
    async fn record(&self, record: QueryRecord) -> QuarryResult<()> {
        let categories_json = match &record.category_filter {
            Some(filter) => Some(serde_json::to_string(
                &filter.categories().collect::<Vec<_>>(),
            )?),
            None => None,
        };
        let chunk_ids_json = serde_json::to_string(
            &record
                .chunk_ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>(),
        )?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO query_history
                 (id, query_text, categories, result_count, retrieval_ms,
                  chunk_ids, degraded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                record.query_text,
                categories_json,
                record.result_count as i64,
                record.retrieval_time.as_millis() as i64,
                chunk_ids_json,
                record.degraded,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

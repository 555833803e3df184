//! Embedded vector index using SQLite with the sqlite-vec extension.
//!
//! Chunk embeddings live in a vec0 virtual table declared with cosine
//! distance, so `nearest` returns `1 - distance` as the similarity the
//! retriever thresholds against. Document id and category ride along as
//! auxiliary columns: the category filter is answered by oversampling the
//! KNN scan and filtering before truncation (vec0 cannot constrain the
//! scan itself), and generation removal deletes by document id.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use zerocopy::IntoBytes;

use quarry_core::{
    CategoryFilter, ChunkId, QuarryError, QuarryResult, VectorIndex, VectorRecord,
};

/// How far the KNN scan oversamples when a category filter applies.
const FILTER_OVERSAMPLE: usize = 10;

/// SQLite-vec backed [`VectorIndex`].
pub struct SqliteVecIndex {
    /// SQLite connection (wrapped in Mutex for Send + Sync).
    conn: Mutex<Connection>,
    /// vec0 table name.
    table: String,
    /// Vector dimension.
    dimension: usize,
}

impl SqliteVecIndex {
    /// Open (or create) an index.
    ///
    /// # Arguments
    /// * `db_path` - SQLite database file, or ":memory:"
    /// * `table` - vec0 table name
    /// * `dimension` - embedding dimension
    pub fn new(db_path: &str, table: &str, dimension: usize) -> QuarryResult<Self> {
        // Register sqlite-vec before opening the connection.
        // SAFETY: sqlite3_auto_extension requires a function pointer cast;
        // this is the documented way to register sqlite-vec with rusqlite.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }

        let conn = Connection::open(db_path).map_err(|e| QuarryError::VectorIndex {
            message: format!("failed to open SQLite database: {e}"),
            source: Some(Box::new(e)),
        })?;

        let version: String = conn
            .query_row("SELECT vec_version()", [], |row| row.get(0))
            .map_err(|e| QuarryError::VectorIndex {
                message: format!("sqlite-vec extension not loaded: {e}"),
                source: Some(Box::new(e)),
            })?;
        tracing::debug!(version, "sqlite-vec loaded");

        let index = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            dimension,
        };
        index.create_table()?;
        Ok(index)
    }

    fn create_table(&self) -> QuarryResult<()> {
        let conn = self.lock()?;
        // The + prefix marks auxiliary columns: stored with the row but not
        // part of the vector index.
        let sql = format!(
            r#"CREATE VIRTUAL TABLE IF NOT EXISTS "{}" USING vec0(
                embedding float[{}] distance_metric=cosine,
                +chunk_id TEXT,
                +document_id TEXT,
                +category TEXT
            )"#,
            self.table, self.dimension
        );
        conn.execute(&sql, []).map_err(|e| QuarryError::VectorIndex {
            message: format!("failed to create vec0 table '{}': {e}", self.table),
            source: Some(Box::new(e)),
        })?;
        Ok(())
    }

    fn lock(&self) -> QuarryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuarryError::vector_index("connection lock poisoned"))
    }

    fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
        vector.as_bytes().to_vec()
    }

    fn op_err(context: &str, e: rusqlite::Error) -> QuarryError {
        QuarryError::VectorIndex {
            message: format!("{context}: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVecIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> QuarryResult<()> {
        let conn = self.lock()?;

        // vec0 has no usable upsert; drop any previous row for the chunk
        // before inserting.
        let delete_sql = format!(
            r#"DELETE FROM "{}" WHERE rowid IN
               (SELECT rowid FROM "{}" WHERE chunk_id = ?)"#,
            self.table, self.table
        );
        let insert_sql = format!(
            r#"INSERT INTO "{}" (embedding, chunk_id, document_id, category)
               VALUES (?, ?, ?, ?)"#,
            self.table
        );

        for record in records {
            if record.embedding.len() != self.dimension {
                return Err(QuarryError::vector_index(format!(
                    "embedding for chunk '{}' has dimension {}, index expects {}",
                    record.chunk_id,
                    record.embedding.len(),
                    self.dimension
                )));
            }
            conn.execute(&delete_sql, [record.chunk_id.as_str()])
                .map_err(|e| Self::op_err("failed to clear previous vector", e))?;
            conn.execute(
                &insert_sql,
                rusqlite::params![
                    Self::vector_to_bytes(&record.embedding),
                    record.chunk_id.as_str(),
                    record.document_id,
                    record.category,
                ],
            )
            .map_err(|e| Self::op_err("failed to insert vector", e))?;
        }
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> QuarryResult<()> {
        let conn = self.lock()?;
        let sql = format!(
            r#"DELETE FROM "{}" WHERE rowid IN
               (SELECT rowid FROM "{}" WHERE document_id = ?)"#,
            self.table, self.table
        );
        let removed = conn
            .execute(&sql, [document_id])
            .map_err(|e| Self::op_err("failed to remove document vectors", e))?;
        tracing::debug!(document_id, removed, "removed document vectors");
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&CategoryFilter>,
    ) -> QuarryResult<Vec<(ChunkId, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;

        let fetch_limit = if filter.is_some() {
            k * FILTER_OVERSAMPLE
        } else {
            k
        };
        let sql = format!(
            r#"SELECT chunk_id, category, distance
               FROM "{}"
               WHERE embedding MATCH ?
               ORDER BY distance
               LIMIT ?"#,
            self.table
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Self::op_err("failed to prepare KNN query", e))?;
        let rows = stmt
            .query_map(
                rusqlite::params![Self::vector_to_bytes(query), fetch_limit],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f32>(2)?,
                    ))
                },
            )
            .map_err(|e| Self::op_err("failed to run KNN query", e))?;

        let mut hits = Vec::new();
        for row in rows {
            let (chunk_id, category, distance) =
                row.map_err(|e| Self::op_err("failed to read KNN row", e))?;
            if let Some(filter) = filter {
                if !filter.matches(&category) {
                    continue;
                }
            }
            // Cosine distance -> cosine similarity.
            hits.push((ChunkId::from(chunk_id), 1.0 - distance));
            if hits.len() == k {
                break;
            }
        }
        Ok(hits)
    }

    async fn len(&self) -> QuarryResult<usize> {
        let conn = self.lock()?;
        let count: usize = conn
            .query_row(
                &format!(r#"SELECT COUNT(*) FROM "{}""#, self.table),
                [],
                |row| row.get(0),
            )
            .map_err(|e| Self::op_err("failed to count vectors", e))?;
        Ok(count)
    }
}

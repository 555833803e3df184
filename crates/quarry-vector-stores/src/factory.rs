//! Factory for creating vector index backends.

use std::sync::Arc;

use quarry_core::{QuarryResult, VectorIndex, VectorIndexConfig, VectorIndexProvider};

use crate::memory::InMemoryVectorIndex;
use crate::sqlite_vec::SqliteVecIndex;

/// Factory for creating vector index backends.
pub struct VectorIndexFactory;

impl VectorIndexFactory {
    /// Create a vector index from the given configuration.
    pub fn create(config: &VectorIndexConfig) -> QuarryResult<Arc<dyn VectorIndex>> {
        match config.provider {
            VectorIndexProvider::Memory => Ok(Arc::new(InMemoryVectorIndex::new())),
            VectorIndexProvider::SqliteVec => {
                let index =
                    SqliteVecIndex::new(&config.db_path, &config.table, config.dimension)?;
                Ok(Arc::new(index))
            }
        }
    }

    /// Create the in-memory reference index.
    pub fn memory() -> Arc<dyn VectorIndex> {
        Arc::new(InMemoryVectorIndex::new())
    }

    /// Create an embedded sqlite-vec index at the given path.
    pub fn sqlite_vec(db_path: &str, dimension: usize) -> QuarryResult<Arc<dyn VectorIndex>> {
        let config = VectorIndexConfig {
            provider: quarry_core::VectorIndexProvider::SqliteVec,
            db_path: db_path.to_string(),
            dimension,
            ..Default::default()
        };
        Self::create(&config)
    }
}

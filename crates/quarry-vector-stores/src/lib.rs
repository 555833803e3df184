//! quarry-vector-stores - Vector index implementations for quarry.
//!
//! Backends implementing [`quarry_core::VectorIndex`]:
//!
//! - **Memory** - brute-force cosine search over an in-memory table.
//!   Exact results, no external state; the reference backend and the
//!   right choice for small corpora and tests.
//! - **SqliteVec** - embedded ANN search via SQLite with the sqlite-vec
//!   extension. File-backed or in-memory.
//!
//! # Example
//!
//! ```ignore
//! use quarry_core::VectorIndexConfig;
//! use quarry_vector_stores::VectorIndexFactory;
//!
//! let index = VectorIndexFactory::create(&VectorIndexConfig::default())?;
//! ```

mod factory;
mod memory;
mod sqlite_vec;

pub use factory::VectorIndexFactory;
pub use memory::InMemoryVectorIndex;
pub use sqlite_vec::SqliteVecIndex;

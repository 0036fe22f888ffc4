//! Infrastructure layer - Storage adapters
//!
//! - `memory`: complete in-process fact store
//! - `sqlite`: recursive-CTE field traversal (feature `sqlite`)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryLineageStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFieldLineage;

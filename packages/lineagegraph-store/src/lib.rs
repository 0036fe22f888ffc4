//! Relationship store for lineage graph reconstruction
//!
//! The engine asks this crate "what does X directly connect to" and gets
//! flat relationship rows back. Nothing here builds graphs.
//!
//! ## Layers
//!
//! - `domain`: value types and the `LineageStore` / `FieldLineageQuery` ports
//! - `infrastructure`: `InMemoryLineageStore` and, with the `sqlite` feature,
//!   `SqliteFieldLineage`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lineagegraph_store::{InMemoryLineageStore, LineageStore};
//!
//! let store = InMemoryLineageStore::new();
//! let raw = store.add_dataset("warehouse", "raw_events");
//! let clean = store.add_dataset("warehouse", "events");
//! let job = store.add_job("warehouse", "clean_events", &[raw], &[clean])?;
//!
//! let producers = store.direct_upstream_jobs(&[clean].into_iter().collect()).await?;
//! assert_eq!(producers[0].key, job);
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    ColumnLineage, ColumnLineageInput, ColumnLineageInputField, ColumnRelationshipRow,
    DatasetData, DatasetName, DatasetVersionSummary, EntityKey, FieldLineageQuery,
    FieldLineageRequest, FieldLink, FieldRef, FieldSummary, JobRelationshipRow, JobSummary,
    LineageStore, RunState, RunSummary, UpstreamRunRow, VersionedFieldKeys,
};

pub use infrastructure::InMemoryLineageStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteFieldLineage;

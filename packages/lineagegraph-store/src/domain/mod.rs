//! Domain layer for the lineage relationship store
//!
//! # Domain Models
//!
//! - `JobRelationshipRow`: one job with the datasets it reads and writes
//! - `ColumnRelationshipRow`: one field with its producer (and consumer) fields
//! - `DatasetData` / `RunSummary`: entity payloads attached to graph nodes
//!
//! # Port Traits
//!
//! - `LineageStore`: every query the traversal engine issues
//! - `FieldLineageQuery`: optional server-side multi-hop field traversal
//!
//! # Examples
//!
//! ```rust,ignore
//! use lineagegraph_store::domain::LineageStore;
//!
//! async fn producers(store: &dyn LineageStore, dataset: EntityKey) -> Result<()> {
//!     let keys = [dataset].into_iter().collect();
//!     for job in store.direct_upstream_jobs(&keys).await? {
//!         println!("{}:{} writes {}", job.namespace, job.name, dataset);
//!     }
//!     Ok(())
//! }
//! ```

mod models;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

pub use models::{
    ColumnLineage, ColumnLineageInput, ColumnLineageInputField, ColumnRelationshipRow,
    DatasetData, DatasetName, DatasetVersionSummary, EntityKey, FieldLineageRequest, FieldLink,
    FieldRef, FieldSummary, JobRelationshipRow, JobSummary, RunState, RunSummary, UpstreamRunRow,
    VersionedFieldKeys,
};

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: LineageStore
// ═══════════════════════════════════════════════════════════════════════════

/// Relationship store abstraction
///
/// Answers "what does X directly connect to" questions. The engine borrows a
/// store for the duration of one request and never owns its lifecycle, so
/// implementations must tolerate concurrent independent calls.
///
/// # Query groups
///
/// 1. **Lookups**: `find_job`, `find_dataset`, `job_for_dataset`
/// 2. **Field-key resolution**: `field_keys_for_*`, `field_key_by_name`, `fields_by_keys`
/// 3. **Job relationships**: `direct_job_relationships`, `direct_upstream_jobs`,
///    `direct_downstream_jobs`, `multi_hop_job_lineage`
/// 4. **Datasets and runs**: `datasets_by_keys`, `latest_run_for`,
///    `out_edge_count_for_dataset`, `upstream_runs`
/// 5. **Field relationships**: `direct_upstream_fields`, `direct_downstream_fields`,
///    `column_lineage_for_datasets`
///
/// # Implementations
///
/// - `InMemoryLineageStore`: in-process fact store
#[async_trait]
pub trait LineageStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════════════════

    /// Key of the job named `namespace:name`
    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>>;

    /// Dataset payload for `namespace:name`
    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetData>>;

    /// Most recently updated job that reads or writes the dataset
    ///
    /// Returns `None` both for unknown datasets and for datasets no job touches.
    async fn job_for_dataset(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Field-key Resolution
    // ═══════════════════════════════════════════════════════════════════════

    /// Field keys of every dataset the job reads or writes
    ///
    /// `None` when the job is unknown.
    async fn field_keys_for_job(&self, namespace: &str, name: &str)
        -> Result<Option<Vec<EntityKey>>>;

    /// Field keys of the datasets touched by one job version
    async fn field_keys_for_job_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>>;

    /// Field keys of the dataset's current schema
    ///
    /// `None` when the dataset is unknown.
    async fn field_keys_for_dataset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<EntityKey>>>;

    /// Field keys recorded on one dataset version
    async fn field_keys_for_dataset_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>>;

    /// Key of the named field on one dataset version
    async fn field_keys_for_dataset_field_version(
        &self,
        field: &str,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>>;

    /// Key of `namespace:dataset:field`
    async fn field_key_by_name(
        &self,
        namespace: &str,
        dataset: &str,
        field: &str,
    ) -> Result<Option<EntityKey>>;

    /// Field payloads for resolved keys, as seen at `as_of`
    ///
    /// Rows carry no links; they exist so seeds are always rendered.
    async fn fields_by_keys(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Job Relationships
    // ═══════════════════════════════════════════════════════════════════════

    /// Jobs whose key is in `keys` or that touch a dataset in `keys`
    async fn direct_job_relationships(
        &self,
        keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>>;

    /// Jobs that write any of the given datasets
    async fn direct_upstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>>;

    /// Jobs that read any of the given datasets
    async fn direct_downstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>>;

    /// Every job within `depth` job-to-job hops of `job_keys`, seeds included
    ///
    /// Expands producers of inputs and, when `with_downstream` is set,
    /// consumers of outputs.
    async fn multi_hop_job_lineage(
        &self,
        job_keys: &BTreeSet<EntityKey>,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<JobRelationshipRow>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Datasets and Runs
    // ═══════════════════════════════════════════════════════════════════════

    /// Dataset payloads; unknown keys are skipped
    async fn datasets_by_keys(&self, keys: &BTreeSet<EntityKey>) -> Result<Vec<DatasetData>>;

    async fn latest_run_for(&self, run: EntityKey) -> Result<Option<RunSummary>>;

    /// Batched `latest_run_for`, keyed by run
    async fn latest_runs_for(
        &self,
        runs: &BTreeSet<EntityKey>,
    ) -> Result<BTreeMap<EntityKey, RunSummary>> {
        let mut found = BTreeMap::new();
        for run in runs {
            if let Some(summary) = self.latest_run_for(*run).await? {
                found.insert(*run, summary);
            }
        }
        Ok(found)
    }

    /// Number of distinct jobs reading the dataset
    async fn out_edge_count_for_dataset(&self, dataset: EntityKey) -> Result<usize>;

    /// Batched `out_edge_count_for_dataset`
    async fn out_edge_counts(
        &self,
        datasets: &BTreeSet<EntityKey>,
    ) -> Result<BTreeMap<EntityKey, usize>> {
        let mut counts = BTreeMap::new();
        for dataset in datasets {
            counts.insert(*dataset, self.out_edge_count_for_dataset(*dataset).await?);
        }
        Ok(counts)
    }

    /// Run -> dataset versions it read -> runs that produced them, up to `depth`
    ///
    /// Rows are flat: a run with three inputs yields three rows, a run with
    /// none yields one row with `input: None`.
    async fn upstream_runs(&self, run: EntityKey, depth: u32) -> Result<Vec<UpstreamRunRow>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Field Relationships
    // ═══════════════════════════════════════════════════════════════════════

    /// One row per given field that has producers, carrying them as `input_fields`
    ///
    /// Only facts of each field's snapshot at `as_of` are used, and both
    /// endpoints must belong to a primary-alias dataset.
    async fn direct_upstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>>;

    /// One row per given field that has consumers, carrying them as `output_fields`
    async fn direct_downstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>>;

    /// Latest column lineage of every field of the named datasets
    async fn column_lineage_for_datasets(
        &self,
        datasets: &[DatasetName],
    ) -> Result<Vec<ColumnRelationshipRow>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: FieldLineageQuery
// ═══════════════════════════════════════════════════════════════════════════

/// Server-side multi-hop field traversal
///
/// Implementations perform the whole depth-limited walk in one call. A path
/// is never extended with a (producer, consumer) pair it already contains,
/// so cyclic field graphs terminate.
///
/// Returned rows describe edges as `field <- input_fields`, for both
/// directions.
#[async_trait]
pub trait FieldLineageQuery: Send + Sync {
    /// Short name used in logs
    fn strategy_name(&self) -> &'static str;

    async fn multi_hop_field_lineage(
        &self,
        request: &FieldLineageRequest,
    ) -> Result<Vec<ColumnRelationshipRow>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

//! Store and strategy wrappers for fault and latency injection

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lineagegraph_store::{
    ColumnRelationshipRow, DatasetData, DatasetName, EntityKey, FieldLineageQuery,
    FieldLineageRequest, JobRelationshipRow, LineageStore, Result, RunSummary, StorageError,
    UpstreamRunRow, VersionedFieldKeys,
};

// ═══════════════════════════════════════════════════════════════════════════
// DelayedStore
// ═══════════════════════════════════════════════════════════════════════════

/// Delegating store that sleeps before every call and tracks concurrency
pub struct DelayedStore {
    inner: Arc<dyn LineageStore>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl DelayedStore {
    pub fn new(inner: Arc<dyn LineageStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn observe<T>(&self, fut: impl Future<Output = T>) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = fut.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl LineageStore for DelayedStore {
    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>> {
        self.observe(self.inner.find_job(namespace, name)).await
    }

    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetData>> {
        self.observe(self.inner.find_dataset(namespace, name)).await
    }

    async fn job_for_dataset(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>> {
        self.observe(self.inner.job_for_dataset(namespace, name)).await
    }

    async fn field_keys_for_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<EntityKey>>> {
        self.observe(self.inner.field_keys_for_job(namespace, name)).await
    }

    async fn field_keys_for_job_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        self.observe(self.inner.field_keys_for_job_version(version)).await
    }

    async fn field_keys_for_dataset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<EntityKey>>> {
        self.observe(self.inner.field_keys_for_dataset(namespace, name)).await
    }

    async fn field_keys_for_dataset_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        self.observe(self.inner.field_keys_for_dataset_version(version)).await
    }

    async fn field_keys_for_dataset_field_version(
        &self,
        field: &str,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        self.observe(self.inner.field_keys_for_dataset_field_version(field, version))
            .await
    }

    async fn field_key_by_name(
        &self,
        namespace: &str,
        dataset: &str,
        field: &str,
    ) -> Result<Option<EntityKey>> {
        self.observe(self.inner.field_key_by_name(namespace, dataset, field))
            .await
    }

    async fn fields_by_keys(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        self.observe(self.inner.fields_by_keys(keys, as_of)).await
    }

    async fn direct_job_relationships(
        &self,
        keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        self.observe(self.inner.direct_job_relationships(keys)).await
    }

    async fn direct_upstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        self.observe(self.inner.direct_upstream_jobs(dataset_keys)).await
    }

    async fn direct_downstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        self.observe(self.inner.direct_downstream_jobs(dataset_keys)).await
    }

    async fn multi_hop_job_lineage(
        &self,
        job_keys: &BTreeSet<EntityKey>,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<JobRelationshipRow>> {
        self.observe(self.inner.multi_hop_job_lineage(job_keys, depth, with_downstream))
            .await
    }

    async fn datasets_by_keys(&self, keys: &BTreeSet<EntityKey>) -> Result<Vec<DatasetData>> {
        self.observe(self.inner.datasets_by_keys(keys)).await
    }

    async fn latest_run_for(&self, run: EntityKey) -> Result<Option<RunSummary>> {
        self.observe(self.inner.latest_run_for(run)).await
    }

    async fn latest_runs_for(
        &self,
        runs: &BTreeSet<EntityKey>,
    ) -> Result<BTreeMap<EntityKey, RunSummary>> {
        self.observe(self.inner.latest_runs_for(runs)).await
    }

    async fn out_edge_count_for_dataset(&self, dataset: EntityKey) -> Result<usize> {
        self.observe(self.inner.out_edge_count_for_dataset(dataset)).await
    }

    async fn out_edge_counts(
        &self,
        datasets: &BTreeSet<EntityKey>,
    ) -> Result<BTreeMap<EntityKey, usize>> {
        self.observe(self.inner.out_edge_counts(datasets)).await
    }

    async fn upstream_runs(&self, run: EntityKey, depth: u32) -> Result<Vec<UpstreamRunRow>> {
        self.observe(self.inner.upstream_runs(run, depth)).await
    }

    async fn direct_upstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        self.observe(self.inner.direct_upstream_fields(keys, as_of)).await
    }

    async fn direct_downstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        self.observe(self.inner.direct_downstream_fields(keys, as_of)).await
    }

    async fn column_lineage_for_datasets(
        &self,
        datasets: &[DatasetName],
    ) -> Result<Vec<ColumnRelationshipRow>> {
        self.observe(self.inner.column_lineage_for_datasets(datasets)).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Strategies
// ═══════════════════════════════════════════════════════════════════════════

/// Strategy that always fails with an unavailable store
#[derive(Default)]
pub struct FailingStrategy {
    calls: AtomicUsize,
}

impl FailingStrategy {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldLineageQuery for FailingStrategy {
    fn strategy_name(&self) -> &'static str {
        "failing"
    }

    async fn multi_hop_field_lineage(
        &self,
        _: &FieldLineageRequest,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::unavailable("federation endpoint unreachable"))
    }
}

/// Strategy that never answers within any reasonable bound
pub struct StalledStrategy;

#[async_trait]
impl FieldLineageQuery for StalledStrategy {
    fn strategy_name(&self) -> &'static str {
        "stalled"
    }

    async fn multi_hop_field_lineage(
        &self,
        _: &FieldLineageRequest,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

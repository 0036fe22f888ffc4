//! Lineage facade
//!
//! Entry point for hosts. A `LineageService` is long-lived and holds the
//! injected store and column strategies; every call runs as one
//! `LineageRequest` with its own cancellation token, wall-clock bound and
//! tracing span.
//!
//! # Examples
//!
//! ```rust,ignore
//! let service = LineageService::builder(store.clone())
//!     .with_recursive(sqlite_strategy)
//!     .with_config(LineageConfig::from_yaml_file("lineage.yaml")?)
//!     .build()?;
//!
//! let lineage = service
//!     .get_column_lineage(&NodeId::dataset_field("ns", "orders", "total"), Some(2), false)
//!     .await?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use lineagegraph_store::{
    ColumnLineage, ColumnLineageInputField, DatasetData, DatasetName, EntityKey,
    FieldLineageQuery, JobRelationshipRow, LineageStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::assembler::{assemble_columns, assemble_jobs};
use crate::config::LineageConfig;
use crate::error::{LineageError, Result};
use crate::graph::{Lineage, UpstreamRunLineage};
use crate::node_id::NodeId;
use crate::resolver::{IdentifierResolver, JobSeed};
use crate::scope::RequestScope;
use crate::traversal::column::{ColumnTraversal, LabelledStrategy};
use crate::traversal::job::JobTraversal;

// ═══════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════

pub struct LineageServiceBuilder {
    store: Arc<dyn LineageStore>,
    federated: Option<Arc<dyn FieldLineageQuery>>,
    recursive: Option<Arc<dyn FieldLineageQuery>>,
    config: LineageConfig,
}

impl LineageServiceBuilder {
    pub fn new(store: Arc<dyn LineageStore>) -> Self {
        Self {
            store,
            federated: None,
            recursive: None,
            config: LineageConfig::default(),
        }
    }

    /// Inject the federated single-query strategy
    pub fn with_federated(mut self, strategy: Arc<dyn FieldLineageQuery>) -> Self {
        self.federated = Some(strategy);
        self
    }

    /// Inject the recursive single-query strategy
    pub fn with_recursive(mut self, strategy: Arc<dyn FieldLineageQuery>) -> Self {
        self.recursive = Some(strategy);
        self
    }

    pub fn with_config(mut self, config: LineageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<LineageService> {
        self.config.validate()?;
        Ok(LineageService {
            store: self.store,
            federated: self.federated,
            recursive: self.recursive,
            config: self.config,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════

pub struct LineageService {
    store: Arc<dyn LineageStore>,
    federated: Option<Arc<dyn FieldLineageQuery>>,
    recursive: Option<Arc<dyn FieldLineageQuery>>,
    config: LineageConfig,
}

impl LineageService {
    pub fn builder(store: Arc<dyn LineageStore>) -> LineageServiceBuilder {
        LineageServiceBuilder::new(store)
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// Request bound to a caller-owned token (client disconnect, shutdown)
    pub fn scoped(&self, token: CancellationToken) -> LineageRequest<'_> {
        LineageRequest {
            service: self,
            scope: RequestScope::new(token),
        }
    }

    /// Request with a fresh token
    pub fn request(&self) -> LineageRequest<'_> {
        self.scoped(CancellationToken::new())
    }

    pub async fn get_lineage(
        &self,
        seed: &NodeId,
        depth: Option<u32>,
        with_downstream: bool,
    ) -> Result<Lineage> {
        self.request().get_lineage(seed, depth, with_downstream).await
    }

    pub async fn get_direct_lineage(&self, seed: &NodeId, depth: Option<u32>) -> Result<Lineage> {
        self.request().get_direct_lineage(seed, depth).await
    }

    pub async fn get_column_lineage(
        &self,
        seed: &NodeId,
        depth: Option<u32>,
        with_downstream: bool,
    ) -> Result<Lineage> {
        self.request()
            .get_column_lineage(seed, depth, with_downstream)
            .await
    }

    pub async fn enrich_with_column_lineage(&self, datasets: &mut [DatasetData]) -> Result<()> {
        self.request().enrich_with_column_lineage(datasets).await
    }

    pub async fn upstream_runs(&self, run: EntityKey, depth: Option<u32>) -> Result<UpstreamRunLineage> {
        self.request().upstream_runs(run, depth).await
    }

    fn column_strategies(&self) -> Vec<LabelledStrategy<'_>> {
        let mut strategies: Vec<LabelledStrategy<'_>> = Vec::new();
        if self.config.column.federated {
            if let Some(strategy) = &self.federated {
                strategies.push(("federated", strategy.as_ref()));
            }
        }
        if self.config.column.recursive {
            if let Some(strategy) = &self.recursive {
                strategies.push(("recursive", strategy.as_ref()));
            }
        }
        strategies
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════

/// Which job-level traversal a request runs
#[derive(Debug, Clone, Copy)]
enum JobMode {
    Accumulate { with_downstream: bool },
    Strict,
}

/// One lineage request; dropped when the call returns
pub struct LineageRequest<'a> {
    service: &'a LineageService,
    scope: RequestScope,
}

impl<'a> LineageRequest<'a> {
    pub fn token(&self) -> &CancellationToken {
        self.scope.token()
    }

    /// Job/dataset lineage, multi-hop expansion done by the store
    pub async fn get_lineage(
        &self,
        seed: &NodeId,
        depth: Option<u32>,
        with_downstream: bool,
    ) -> Result<Lineage> {
        let depth = self.service.config.effective_depth(depth);
        self.run(
            "get_lineage",
            seed,
            depth,
            self.job_lineage(seed, depth, JobMode::Accumulate { with_downstream }),
        )
        .await
    }

    /// Job/dataset lineage, per-level with fan-out truncation
    pub async fn get_direct_lineage(&self, seed: &NodeId, depth: Option<u32>) -> Result<Lineage> {
        let depth = self.service.config.effective_depth(depth);
        self.run(
            "get_direct_lineage",
            seed,
            depth,
            self.job_lineage(seed, depth, JobMode::Strict),
        )
        .await
    }

    pub async fn get_column_lineage(
        &self,
        seed: &NodeId,
        depth: Option<u32>,
        with_downstream: bool,
    ) -> Result<Lineage> {
        let depth = self.service.config.effective_depth(depth);
        self.run(
            "get_column_lineage",
            seed,
            depth,
            self.column_lineage(seed, depth, with_downstream),
        )
        .await
    }

    /// Attach column lineage to the datasets that have any; others are left alone
    pub async fn enrich_with_column_lineage(&self, datasets: &mut [DatasetData]) -> Result<()> {
        let names: Vec<DatasetName> = datasets.iter().map(DatasetData::dataset_name).collect();
        let store = self.service.store.as_ref();
        let span = tracing::info_span!("enrich_with_column_lineage", datasets = names.len());
        let rows = self
            .scope
            .bounded(
                self.service.config.request_timeout(),
                self.scope.call(store.column_lineage_for_datasets(&names)),
            )
            .instrument(span)
            .await?;

        let mut by_dataset: BTreeMap<DatasetName, BTreeMap<String, Vec<ColumnLineageInputField>>> =
            BTreeMap::new();
        for row in rows {
            let name = DatasetName::new(row.field.namespace.clone(), row.field.dataset.clone());
            let inputs = by_dataset
                .entry(name)
                .or_default()
                .entry(row.field.field.clone())
                .or_default();
            for link in row.input_fields {
                let input = ColumnLineageInputField {
                    namespace: link.field.namespace,
                    dataset: link.field.dataset,
                    field: link.field.field,
                    transformation_description: link.transformation_description,
                    transformation_type: link.transformation_type,
                };
                if !inputs.contains(&input) {
                    inputs.push(input);
                }
            }
        }

        let mut enriched = 0;
        for dataset in datasets.iter_mut() {
            let Some(fields) = by_dataset.remove(&dataset.dataset_name()) else {
                continue;
            };
            dataset.column_lineage = Some(
                fields
                    .into_iter()
                    .map(|(name, input_fields)| ColumnLineage { name, input_fields })
                    .collect(),
            );
            enriched += 1;
        }
        debug!("Enriched {} of {} dataset(s) with column lineage", enriched, datasets.len());
        Ok(())
    }

    /// Runs that fed `run`, walking run → input version → producing run
    pub async fn upstream_runs(&self, run: EntityKey, depth: Option<u32>) -> Result<UpstreamRunLineage> {
        let depth = self.service.config.effective_depth(depth);
        let store = self.service.store.as_ref();
        let span = tracing::info_span!("upstream_runs", run = %run, depth);
        let rows = self
            .scope
            .bounded(
                self.service.config.request_timeout(),
                self.scope.call(store.upstream_runs(run, depth)),
            )
            .instrument(span)
            .await?;
        Ok(UpstreamRunLineage::from_rows(rows))
    }

    async fn run<F>(&self, operation: &'static str, seed: &NodeId, depth: u32, fut: F) -> Result<Lineage>
    where
        F: Future<Output = Result<Lineage>>,
    {
        let span = tracing::info_span!("lineage_request", operation, seed = %seed, depth);
        async {
            let lineage = self
                .scope
                .bounded(self.service.config.request_timeout(), fut)
                .await?;
            info!(
                "{} returned {} node(s), {} edge(s)",
                operation,
                lineage.len(),
                lineage.edges().len()
            );
            Ok(lineage)
        }
        .instrument(span)
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Job-level
    // ═══════════════════════════════════════════════════════════════════════

    async fn job_lineage(&self, seed: &NodeId, depth: u32, mode: JobMode) -> Result<Lineage> {
        let store = self.service.store.as_ref();
        let resolver = IdentifierResolver::new(store, &self.scope);
        let traversal = JobTraversal::new(
            store,
            &self.scope,
            self.service.config.traversal.fan_out_threshold,
        );

        let (job, dataset) = match resolver.resolve_job(seed).await? {
            JobSeed::Job(job) => (job, None),
            JobSeed::Dataset { dataset, job: None } => {
                info!("No job touches {}, returning orphan graph", seed);
                return Ok(Lineage::orphan_dataset(*dataset));
            }
            JobSeed::Dataset { dataset, .. } if depth == 0 => {
                return Ok(Lineage::orphan_dataset(*dataset));
            }
            JobSeed::Dataset {
                dataset,
                job: Some(job),
            } => (job, Some(dataset)),
        };

        let rows = match mode {
            JobMode::Accumulate { with_downstream } => {
                traversal
                    .accumulate(&BTreeSet::from([job]), depth, with_downstream)
                    .await?
            }
            JobMode::Strict => traversal.strict(job, depth).await?,
        };

        if let Some(dataset) = dataset {
            if !touches(&rows, dataset.key) {
                info!("{} is not connected to any discovered job, returning orphan graph", seed);
                return Ok(Lineage::orphan_dataset(*dataset));
            }
        } else if rows.is_empty() {
            return Err(LineageError::not_found(seed));
        }

        let parts = traversal.enrich(rows).await?;
        let lineage = assemble_jobs(&parts.jobs, &parts.datasets, &parts.latest_runs, false);
        if depth == 0 {
            return Ok(seed_only(lineage, seed));
        }
        Ok(lineage)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Column-level
    // ═══════════════════════════════════════════════════════════════════════

    async fn column_lineage(&self, seed: &NodeId, depth: u32, with_downstream: bool) -> Result<Lineage> {
        let store = self.service.store.as_ref();
        let resolved = IdentifierResolver::new(store, &self.scope)
            .resolve_fields(seed)
            .await?;
        if resolved.is_empty() {
            return Err(LineageError::not_found(seed));
        }

        let seeds = self
            .scope
            .call(store.fields_by_keys(&resolved.keys, resolved.as_of))
            .await?;
        let traversal =
            ColumnTraversal::new(store, &self.scope, self.service.column_strategies());
        let rows = traversal.traverse(&resolved, depth, with_downstream).await?;

        Ok(assemble_columns(&rows, &seeds, seed.has_version()))
    }
}

fn touches(rows: &[JobRelationshipRow], dataset: EntityKey) -> bool {
    rows.iter()
        .any(|row| row.input_keys.contains(&dataset) || row.output_keys.contains(&dataset))
}

/// Keep only the seed node, without edges
fn seed_only(lineage: Lineage, seed: &NodeId) -> Lineage {
    Lineage::new(
        lineage
            .into_nodes()
            .into_iter()
            .filter(|node| node.id == *seed)
            .map(|node| node.with_edges(BTreeSet::new(), BTreeSet::new())),
    )
}

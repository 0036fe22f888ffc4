//! Job-level traversal
//!
//! Accumulation mode hands the whole multi-hop expansion to the store.
//! Strict mode walks one level at a time per direction and refuses to cross
//! fan-out boundaries: datasets read by more than `fan_out_threshold` jobs.
//!
//! A hop is job → dataset → job, so `depth` counts jobs away from the seed.

use std::collections::{BTreeMap, BTreeSet};

use lineagegraph_store::{DatasetData, EntityKey, JobRelationshipRow, LineageStore, RunSummary};
use tracing::{debug, info};

use crate::error::Result;
use crate::scope::RequestScope;
use crate::traversal::{Direction, TraversalFrontier};

/// Everything the assembler needs for a job graph
#[derive(Debug, Clone, Default)]
pub struct JobGraphParts {
    pub jobs: Vec<JobRelationshipRow>,
    pub datasets: Vec<DatasetData>,
    pub latest_runs: BTreeMap<EntityKey, RunSummary>,
}

pub struct JobTraversal<'a> {
    store: &'a dyn LineageStore,
    scope: &'a RequestScope,
    fan_out_threshold: usize,
}

impl<'a> JobTraversal<'a> {
    pub fn new(store: &'a dyn LineageStore, scope: &'a RequestScope, fan_out_threshold: usize) -> Self {
        Self {
            store,
            scope,
            fan_out_threshold,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accumulation mode
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn accumulate(
        &self,
        seeds: &BTreeSet<EntityKey>,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<JobRelationshipRow>> {
        let rows = self
            .scope
            .call(self.store.multi_hop_job_lineage(seeds, depth, with_downstream))
            .await?;
        debug!("Accumulated {} job(s) within {} hop(s)", rows.len(), depth);
        Ok(rows)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Strict per-level mode
    // ═══════════════════════════════════════════════════════════════════════

    /// Both directions from one job, merged by key
    ///
    /// Empty when the seed job has no row in the store.
    pub async fn strict(&self, seed: EntityKey, depth: u32) -> Result<Vec<JobRelationshipRow>> {
        let seed_row = self
            .scope
            .call(self.store.direct_job_relationships(&BTreeSet::from([seed])))
            .await?
            .into_iter()
            .find(|row| row.key == seed);
        let Some(seed_row) = seed_row else {
            return Ok(Vec::new());
        };

        let (upstream, downstream) = futures::try_join!(
            self.walk(&seed_row, depth, Direction::Upstream),
            self.walk(&seed_row, depth, Direction::Downstream),
        )?;

        let mut merged: BTreeMap<EntityKey, JobRelationshipRow> = upstream;
        for (key, row) in downstream {
            merged.entry(key).or_insert(row);
        }
        Ok(merged.into_values().collect())
    }

    async fn walk(
        &self,
        seed: &JobRelationshipRow,
        depth: u32,
        direction: Direction,
    ) -> Result<BTreeMap<EntityKey, JobRelationshipRow>> {
        let mut frontier = TraversalFrontier::new([seed.key]);
        frontier.discover(seed.key, seed.clone());

        while !frontier.is_exhausted(depth) {
            let datasets: BTreeSet<EntityKey> = frontier
                .current_level()
                .iter()
                .filter_map(|key| frontier.discovered().get(key))
                .flat_map(|row| match direction {
                    Direction::Upstream => row.input_keys.iter(),
                    Direction::Downstream => row.output_keys.iter(),
                })
                .copied()
                .collect();
            if datasets.is_empty() {
                break;
            }

            let crossable = self.crossable(&datasets, frontier.level(), direction).await?;
            if crossable.is_empty() {
                break;
            }

            let jobs = match direction {
                Direction::Upstream => self.scope.call(self.store.direct_upstream_jobs(&crossable)).await?,
                Direction::Downstream => {
                    self.scope
                        .call(self.store.direct_downstream_jobs(&crossable))
                        .await?
                }
            };

            let mut next = Vec::new();
            for job in jobs {
                if !frontier.is_visited(&job.key) {
                    next.push(job.key);
                    frontier.discover(job.key, job);
                }
            }
            let added = frontier.advance(next);
            debug!(
                "{} level {}: {} new job(s) through {} dataset(s)",
                direction,
                frontier.level(),
                added,
                crossable.len()
            );
        }

        Ok(frontier.into_discovered())
    }

    /// Datasets at or under the fan-out threshold
    async fn crossable(
        &self,
        datasets: &BTreeSet<EntityKey>,
        level: u32,
        direction: Direction,
    ) -> Result<BTreeSet<EntityKey>> {
        let counts = self.scope.call(self.store.out_edge_counts(datasets)).await?;
        let (crossable, boundary): (BTreeSet<EntityKey>, BTreeSet<EntityKey>) = datasets
            .iter()
            .copied()
            .partition(|key| counts.get(key).copied().unwrap_or(0) <= self.fan_out_threshold);
        if !boundary.is_empty() {
            info!(
                "{} level {}: stopping at {} fan-out boundary dataset(s) (threshold {})",
                direction,
                level,
                boundary.len(),
                self.fan_out_threshold
            );
        }
        Ok(crossable)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Enrichment
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetch dataset payloads and latest runs for discovered jobs
    pub async fn enrich(&self, jobs: Vec<JobRelationshipRow>) -> Result<JobGraphParts> {
        let dataset_keys: BTreeSet<EntityKey> = jobs
            .iter()
            .flat_map(|job| job.dataset_keys())
            .copied()
            .collect();
        let run_keys: BTreeSet<EntityKey> = jobs.iter().filter_map(|job| job.current_run).collect();

        let (datasets, latest_runs) = futures::try_join!(
            self.scope.call(self.store.datasets_by_keys(&dataset_keys)),
            self.scope.call(self.store.latest_runs_for(&run_keys)),
        )?;
        Ok(JobGraphParts {
            jobs,
            datasets,
            latest_runs,
        })
    }
}

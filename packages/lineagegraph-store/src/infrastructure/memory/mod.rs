//! In-memory relationship store
//!
//! A complete fact store kept behind a single `RwLock`: datasets (with their
//! alias flag), dataset versions, fields, jobs, job versions, runs and
//! column-lineage facts. Queries never hold the lock across an await point.
//!
//! Besides `LineageStore` it implements `FieldLineageQuery`: a breadth-first
//! field walk bounded by depth, run on the blocking pool so request timeouts
//! can fire while it works.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{
    ColumnLineageInput, ColumnRelationshipRow, DatasetData, DatasetName, DatasetVersionSummary,
    EntityKey, FieldLineageQuery, FieldLineageRequest, FieldLink, FieldRef, FieldSummary,
    JobRelationshipRow, JobSummary, LineageStore, RunState, RunSummary, UpstreamRunRow,
    VersionedFieldKeys,
};
use crate::{Result, StorageError};

// ═══════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct DatasetRecord {
    key: EntityKey,
    namespace: String,
    name: String,
    description: Option<String>,
    is_primary: bool,
    current_version: Option<EntityKey>,
    fields: Vec<EntityKey>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FieldRecord {
    dataset: EntityKey,
    name: String,
    field_type: Option<String>,
}

#[derive(Debug, Clone)]
struct DatasetVersionRecord {
    dataset: EntityKey,
    fields: Vec<EntityKey>,
    run: Option<EntityKey>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct JobRecord {
    key: EntityKey,
    namespace: String,
    name: String,
    job_type: Option<String>,
    parent: Option<EntityKey>,
    current_version: Option<EntityKey>,
    current_run: Option<EntityKey>,
    inputs: BTreeSet<EntityKey>,
    outputs: BTreeSet<EntityKey>,
    updated_at: DateTime<Utc>,
    /// Insertion order, breaks `updated_at` ties
    seq: u64,
}

#[derive(Debug, Clone)]
struct JobVersionRecord {
    datasets: BTreeSet<EntityKey>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RunRecord {
    summary: RunSummary,
    job_version: Option<EntityKey>,
    inputs: Vec<EntityKey>,
}

#[derive(Debug, Clone)]
struct ColumnFact {
    output_version: EntityKey,
    output_field: EntityKey,
    input_version: EntityKey,
    input_field: EntityKey,
    transformation_description: Option<String>,
    transformation_type: Option<String>,
    created_at: DateTime<Utc>,
}

/// (output version, output field, input version, input field)
type FactKey = (EntityKey, EntityKey, EntityKey, EntityKey);

#[derive(Debug, Default)]
struct State {
    datasets: BTreeMap<EntityKey, DatasetRecord>,
    fields: BTreeMap<EntityKey, FieldRecord>,
    dataset_versions: BTreeMap<EntityKey, DatasetVersionRecord>,
    jobs: BTreeMap<EntityKey, JobRecord>,
    job_versions: BTreeMap<EntityKey, JobVersionRecord>,
    runs: BTreeMap<EntityKey, RunRecord>,
    facts: BTreeMap<FactKey, ColumnFact>,
    seq: u64,
}

impl State {
    fn dataset_by_name(&self, namespace: &str, name: &str) -> Option<&DatasetRecord> {
        self.datasets
            .values()
            .find(|d| d.namespace == namespace && d.name == name)
    }

    fn job_by_name(&self, namespace: &str, name: &str) -> Option<&JobRecord> {
        self.jobs
            .values()
            .find(|j| j.namespace == namespace && j.name == name)
    }

    fn dataset_fields(&self, datasets: impl IntoIterator<Item = EntityKey>) -> Vec<EntityKey> {
        datasets
            .into_iter()
            .filter_map(|d| self.datasets.get(&d))
            .flat_map(|d| d.fields.iter().copied())
            .collect()
    }

    fn is_primary_field(&self, field: EntityKey) -> bool {
        self.fields
            .get(&field)
            .and_then(|f| self.datasets.get(&f.dataset))
            .is_some_and(|d| d.is_primary)
    }

    fn field_ref(&self, field: EntityKey, version: Option<EntityKey>) -> Option<FieldRef> {
        let record = self.fields.get(&field)?;
        let dataset = self.datasets.get(&record.dataset)?;
        Some(FieldRef {
            key: field,
            namespace: dataset.namespace.clone(),
            dataset: dataset.name.clone(),
            field: record.name.clone(),
            dataset_version: version,
        })
    }

    fn field_type(&self, field: EntityKey) -> Option<String> {
        self.fields.get(&field).and_then(|f| f.field_type.clone())
    }

    /// Facts of the most recent recording of `output` at or before `as_of`
    fn snapshot(&self, output: EntityKey, as_of: DateTime<Utc>) -> Vec<&ColumnFact> {
        let eligible: Vec<&ColumnFact> = self
            .facts
            .values()
            .filter(|f| f.output_field == output && f.created_at <= as_of)
            .collect();
        let Some(latest) = eligible.iter().map(|f| f.created_at).max() else {
            return Vec::new();
        };
        eligible
            .into_iter()
            .filter(|f| f.created_at == latest)
            .collect()
    }

    /// Snapshot facts of `output` whose endpoints are both primary
    fn upstream_edges(&self, output: EntityKey, as_of: DateTime<Utc>) -> Vec<&ColumnFact> {
        if !self.is_primary_field(output) {
            return Vec::new();
        }
        self.snapshot(output, as_of)
            .into_iter()
            .filter(|f| self.is_primary_field(f.input_field))
            .collect()
    }

    /// Snapshot facts (of any output) that read `input`
    fn downstream_edges(&self, input: EntityKey, as_of: DateTime<Utc>) -> Vec<&ColumnFact> {
        if !self.is_primary_field(input) {
            return Vec::new();
        }
        let outputs: BTreeSet<EntityKey> = self
            .facts
            .values()
            .filter(|f| f.input_field == input)
            .map(|f| f.output_field)
            .collect();
        outputs
            .into_iter()
            .filter(|o| self.is_primary_field(*o))
            .flat_map(|o| self.snapshot(o, as_of))
            .filter(|f| f.input_field == input)
            .collect()
    }

    fn input_link(&self, fact: &ColumnFact) -> Option<FieldLink> {
        Some(FieldLink {
            field: self.field_ref(fact.input_field, Some(fact.input_version))?,
            transformation_description: fact.transformation_description.clone(),
            transformation_type: fact.transformation_type.clone(),
        })
    }

    fn output_link(&self, fact: &ColumnFact) -> Option<FieldLink> {
        Some(FieldLink {
            field: self.field_ref(fact.output_field, Some(fact.output_version))?,
            transformation_description: fact.transformation_description.clone(),
            transformation_type: fact.transformation_type.clone(),
        })
    }

    /// Dataset version a field is seen under at `as_of`
    fn field_version_at(&self, field: EntityKey, as_of: DateTime<Utc>) -> Option<EntityKey> {
        if let Some(fact) = self.snapshot(field, as_of).first() {
            return Some(fact.output_version);
        }
        self.dataset_versions
            .iter()
            .filter(|(_, v)| v.created_at <= as_of && v.fields.contains(&field))
            .max_by_key(|(_, v)| v.created_at)
            .map(|(key, _)| *key)
    }

    fn job_row(&self, job: &JobRecord) -> JobRelationshipRow {
        JobRelationshipRow {
            key: job.key,
            namespace: job.namespace.clone(),
            name: job.name.clone(),
            job_type: job.job_type.clone(),
            version: job.current_version,
            current_run: job.current_run,
            parent_job: job.parent,
            input_keys: job.inputs.clone(),
            output_keys: job.outputs.clone(),
            updated_at: job.updated_at,
        }
    }

    fn dataset_data(&self, dataset: &DatasetRecord) -> DatasetData {
        let fields = dataset
            .fields
            .iter()
            .filter_map(|f| self.fields.get(f))
            .map(|f| FieldSummary {
                name: f.name.clone(),
                field_type: f.field_type.clone(),
            })
            .collect();
        DatasetData {
            key: dataset.key,
            namespace: dataset.namespace.clone(),
            name: dataset.name.clone(),
            description: dataset.description.clone(),
            current_version: dataset.current_version,
            fields,
            created_at: dataset.created_at,
            updated_at: dataset.updated_at,
            column_lineage: None,
        }
    }

    fn jobs_where(&self, pred: impl Fn(&JobRecord) -> bool) -> Vec<JobRelationshipRow> {
        self.jobs
            .values()
            .filter(|j| pred(j))
            .map(|j| self.job_row(j))
            .collect()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Group edges `output <- input` into one row per output field version
fn group_edges(
    state: &State,
    edges: &BTreeSet<(EntityKey, FactKey)>,
) -> Vec<ColumnRelationshipRow> {
    let mut rows: BTreeMap<(EntityKey, EntityKey), ColumnRelationshipRow> = BTreeMap::new();
    for (_, fact_key) in edges {
        let Some(fact) = state.facts.get(fact_key) else {
            continue;
        };
        let Some(link) = state.input_link(fact) else {
            continue;
        };
        let slot = (fact.output_field, fact.output_version);
        if !rows.contains_key(&slot) {
            let Some(field) = state.field_ref(fact.output_field, Some(fact.output_version)) else {
                continue;
            };
            rows.insert(
                slot,
                ColumnRelationshipRow::new(field, state.field_type(fact.output_field)),
            );
        }
        if let Some(row) = rows.get_mut(&slot) {
            if !row.input_fields.contains(&link) {
                row.input_fields.push(link);
            }
        }
    }
    rows.into_values()
        .map(|mut row| {
            row.input_fields.sort();
            row
        })
        .collect()
}

fn fact_key(fact: &ColumnFact) -> FactKey {
    (
        fact.output_version,
        fact.output_field,
        fact.input_version,
        fact.input_field,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// InMemoryLineageStore
// ═══════════════════════════════════════════════════════════════════════════

/// In-process lineage fact store
///
/// # Examples
///
/// ```rust,ignore
/// let store = InMemoryLineageStore::new();
/// let orders = store.add_dataset("ns", "orders");
/// let total = store.add_field(orders, "total", Some("DECIMAL"))?;
/// let v1 = store.add_dataset_version(orders, None, Utc::now())?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLineageStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fixture API
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a dataset under its primary name
    pub fn add_dataset(&self, namespace: &str, name: &str) -> EntityKey {
        self.insert_dataset(namespace, name, true)
    }

    /// Register a symlink alias; its fields never appear in field lineage
    pub fn add_symlink_dataset(&self, namespace: &str, name: &str) -> EntityKey {
        self.insert_dataset(namespace, name, false)
    }

    fn insert_dataset(&self, namespace: &str, name: &str, is_primary: bool) -> EntityKey {
        let key = EntityKey::new();
        let now = Utc::now();
        self.state.write().datasets.insert(
            key,
            DatasetRecord {
                key,
                namespace: namespace.to_string(),
                name: name.to_string(),
                description: None,
                is_primary,
                current_version: None,
                fields: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );
        key
    }

    pub fn set_dataset_description(&self, dataset: EntityKey, description: &str) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .datasets
            .get_mut(&dataset)
            .ok_or_else(|| StorageError::not_found(format!("dataset {}", dataset)))?;
        record.description = Some(description.to_string());
        Ok(())
    }

    pub fn add_field(
        &self,
        dataset: EntityKey,
        name: &str,
        field_type: Option<&str>,
    ) -> Result<EntityKey> {
        let mut state = self.state.write();
        let record = state
            .datasets
            .get_mut(&dataset)
            .ok_or_else(|| StorageError::not_found(format!("dataset {}", dataset)))?;
        let key = EntityKey::new();
        record.fields.push(key);
        state.fields.insert(
            key,
            FieldRecord {
                dataset,
                name: name.to_string(),
                field_type: field_type.map(str::to_string),
            },
        );
        Ok(key)
    }

    /// Snapshot the dataset's current fields as a new version
    pub fn add_dataset_version(
        &self,
        dataset: EntityKey,
        run: Option<EntityKey>,
        at: DateTime<Utc>,
    ) -> Result<EntityKey> {
        let mut state = self.state.write();
        let record = state
            .datasets
            .get_mut(&dataset)
            .ok_or_else(|| StorageError::not_found(format!("dataset {}", dataset)))?;
        let key = EntityKey::new();
        record.current_version = Some(key);
        record.updated_at = at;
        let fields = record.fields.clone();
        state.dataset_versions.insert(
            key,
            DatasetVersionRecord {
                dataset,
                fields,
                run,
                created_at: at,
            },
        );
        Ok(key)
    }

    pub fn add_job(
        &self,
        namespace: &str,
        name: &str,
        inputs: &[EntityKey],
        outputs: &[EntityKey],
    ) -> Result<EntityKey> {
        let mut state = self.state.write();
        if let Some(missing) = inputs
            .iter()
            .chain(outputs)
            .find(|d| !state.datasets.contains_key(*d))
        {
            return Err(StorageError::not_found(format!("dataset {}", missing)));
        }
        let key = EntityKey::new();
        let seq = state.next_seq();
        state.jobs.insert(
            key,
            JobRecord {
                key,
                namespace: namespace.to_string(),
                name: name.to_string(),
                job_type: Some("BATCH".to_string()),
                parent: None,
                current_version: None,
                current_run: None,
                inputs: inputs.iter().copied().collect(),
                outputs: outputs.iter().copied().collect(),
                updated_at: Utc::now(),
                seq,
            },
        );
        Ok(key)
    }

    pub fn set_parent_job(&self, job: EntityKey, parent: EntityKey) -> Result<()> {
        let mut state = self.state.write();
        if !state.jobs.contains_key(&parent) {
            return Err(StorageError::not_found(format!("job {}", parent)));
        }
        let record = state
            .jobs
            .get_mut(&job)
            .ok_or_else(|| StorageError::not_found(format!("job {}", job)))?;
        record.parent = Some(parent);
        Ok(())
    }

    /// Snapshot the job's current inputs and outputs as a new version
    pub fn add_job_version(&self, job: EntityKey, at: DateTime<Utc>) -> Result<EntityKey> {
        let mut state = self.state.write();
        let seq = state.next_seq();
        let record = state
            .jobs
            .get_mut(&job)
            .ok_or_else(|| StorageError::not_found(format!("job {}", job)))?;
        let key = EntityKey::new();
        record.current_version = Some(key);
        record.updated_at = at;
        record.seq = seq;
        let datasets = record.inputs.union(&record.outputs).copied().collect();
        state.job_versions.insert(
            key,
            JobVersionRecord {
                datasets,
                created_at: at,
            },
        );
        Ok(key)
    }

    /// Record a run of `job` that read the given dataset versions
    pub fn add_run(
        &self,
        job: EntityKey,
        run_state: RunState,
        inputs: &[EntityKey],
        at: DateTime<Utc>,
    ) -> Result<EntityKey> {
        let mut state = self.state.write();
        if let Some(missing) = inputs
            .iter()
            .find(|v| !state.dataset_versions.contains_key(*v))
        {
            return Err(StorageError::not_found(format!("dataset version {}", missing)));
        }
        let seq = state.next_seq();
        let record = state
            .jobs
            .get_mut(&job)
            .ok_or_else(|| StorageError::not_found(format!("job {}", job)))?;
        let key = EntityKey::new();
        record.current_run = Some(key);
        record.updated_at = at;
        record.seq = seq;
        let job_version = record.current_version;
        let ended_at = run_state.is_done().then_some(at);
        state.runs.insert(
            key,
            RunRecord {
                summary: RunSummary {
                    key,
                    job,
                    state: run_state,
                    created_at: at,
                    started_at: Some(at),
                    ended_at,
                },
                job_version,
                inputs: inputs.to_vec(),
            },
        );
        Ok(key)
    }

    /// Record that `output_field` (on `output_version`) derives from `inputs`
    ///
    /// Upsert keyed by (output version, output field, input version, input
    /// field): re-recording an existing key replaces the transformation and
    /// keeps the original `created_at`.
    pub fn record_column_lineage(
        &self,
        output_version: EntityKey,
        output_field: EntityKey,
        inputs: &[ColumnLineageInput],
        transformation_description: Option<&str>,
        transformation_type: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let versions =
            std::iter::once(output_version).chain(inputs.iter().map(|i| i.dataset_version));
        for version in versions {
            if !state.dataset_versions.contains_key(&version) {
                return Err(StorageError::not_found(format!("dataset version {}", version)));
            }
        }
        let fields = std::iter::once(output_field).chain(inputs.iter().map(|i| i.field));
        for field in fields {
            if !state.fields.contains_key(&field) {
                return Err(StorageError::not_found(format!("field {}", field)));
            }
        }

        for input in inputs {
            let key = (output_version, output_field, input.dataset_version, input.field);
            let description = transformation_description.map(str::to_string);
            let kind = transformation_type.map(str::to_string);
            match state.facts.entry(key) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.transformation_description = description;
                    existing.transformation_type = kind;
                }
                Entry::Vacant(entry) => {
                    entry.insert(ColumnFact {
                        output_version,
                        output_field,
                        input_version: input.dataset_version,
                        input_field: input.field,
                        transformation_description: description,
                        transformation_type: kind,
                        created_at: at,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn column_lineage_fact_count(&self) -> usize {
        self.state.read().facts.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LineageStore
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LineageStore for InMemoryLineageStore {
    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>> {
        Ok(self.state.read().job_by_name(namespace, name).map(|j| j.key))
    }

    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetData>> {
        let state = self.state.read();
        Ok(state
            .dataset_by_name(namespace, name)
            .map(|d| state.dataset_data(d)))
    }

    async fn job_for_dataset(&self, namespace: &str, name: &str) -> Result<Option<EntityKey>> {
        let state = self.state.read();
        let Some(dataset) = state.dataset_by_name(namespace, name) else {
            return Ok(None);
        };
        Ok(state
            .jobs
            .values()
            .filter(|j| j.inputs.contains(&dataset.key) || j.outputs.contains(&dataset.key))
            .max_by_key(|j| (j.updated_at, j.seq))
            .map(|j| j.key))
    }

    async fn field_keys_for_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<EntityKey>>> {
        let state = self.state.read();
        Ok(state
            .job_by_name(namespace, name)
            .map(|j| state.dataset_fields(j.inputs.union(&j.outputs).copied())))
    }

    async fn field_keys_for_job_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        let state = self.state.read();
        Ok(state.job_versions.get(&version).map(|v| VersionedFieldKeys {
            keys: state.dataset_fields(v.datasets.iter().copied()),
            created_at: Some(v.created_at),
        }))
    }

    async fn field_keys_for_dataset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Vec<EntityKey>>> {
        let state = self.state.read();
        Ok(state
            .dataset_by_name(namespace, name)
            .map(|d| d.fields.clone()))
    }

    async fn field_keys_for_dataset_version(
        &self,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        let state = self.state.read();
        Ok(state
            .dataset_versions
            .get(&version)
            .map(|v| VersionedFieldKeys {
                keys: v.fields.clone(),
                created_at: Some(v.created_at),
            }))
    }

    async fn field_keys_for_dataset_field_version(
        &self,
        field: &str,
        version: EntityKey,
    ) -> Result<Option<VersionedFieldKeys>> {
        let state = self.state.read();
        Ok(state
            .dataset_versions
            .get(&version)
            .map(|v| VersionedFieldKeys {
                keys: v
                    .fields
                    .iter()
                    .copied()
                    .filter(|f| state.fields.get(f).is_some_and(|r| r.name == field))
                    .collect(),
                created_at: Some(v.created_at),
            }))
    }

    async fn field_key_by_name(
        &self,
        namespace: &str,
        dataset: &str,
        field: &str,
    ) -> Result<Option<EntityKey>> {
        let state = self.state.read();
        Ok(state.dataset_by_name(namespace, dataset).and_then(|d| {
            d.fields
                .iter()
                .copied()
                .find(|f| state.fields.get(f).is_some_and(|r| r.name == field))
        }))
    }

    async fn fields_by_keys(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let state = self.state.read();
        Ok(keys
            .iter()
            .filter_map(|key| {
                let field = state.field_ref(*key, state.field_version_at(*key, as_of))?;
                Some(ColumnRelationshipRow::new(field, state.field_type(*key)))
            })
            .collect())
    }

    async fn direct_job_relationships(
        &self,
        keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        let state = self.state.read();
        Ok(state.jobs_where(|j| {
            keys.contains(&j.key)
                || j.inputs.iter().chain(j.outputs.iter()).any(|d| keys.contains(d))
        }))
    }

    async fn direct_upstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        let state = self.state.read();
        Ok(state.jobs_where(|j| j.outputs.iter().any(|d| dataset_keys.contains(d))))
    }

    async fn direct_downstream_jobs(
        &self,
        dataset_keys: &BTreeSet<EntityKey>,
    ) -> Result<Vec<JobRelationshipRow>> {
        let state = self.state.read();
        Ok(state.jobs_where(|j| j.inputs.iter().any(|d| dataset_keys.contains(d))))
    }

    async fn multi_hop_job_lineage(
        &self,
        job_keys: &BTreeSet<EntityKey>,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<JobRelationshipRow>> {
        let state = self.state.read();
        let mut visited: BTreeSet<EntityKey> = job_keys
            .iter()
            .copied()
            .filter(|k| state.jobs.contains_key(k))
            .collect();
        let mut frontier = visited.clone();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let (inputs, outputs): (BTreeSet<EntityKey>, BTreeSet<EntityKey>) = frontier
                .iter()
                .filter_map(|k| state.jobs.get(k))
                .fold((BTreeSet::new(), BTreeSet::new()), |(mut i, mut o), j| {
                    i.extend(j.inputs.iter().copied());
                    o.extend(j.outputs.iter().copied());
                    (i, o)
                });
            let mut next = BTreeSet::new();
            for job in state.jobs.values() {
                let producer = job.outputs.iter().any(|d| inputs.contains(d));
                let consumer = with_downstream && job.inputs.iter().any(|d| outputs.contains(d));
                if (producer || consumer) && visited.insert(job.key) {
                    next.insert(job.key);
                }
            }
            frontier = next;
        }

        Ok(visited
            .iter()
            .filter_map(|k| state.jobs.get(k))
            .map(|j| state.job_row(j))
            .collect())
    }

    async fn datasets_by_keys(&self, keys: &BTreeSet<EntityKey>) -> Result<Vec<DatasetData>> {
        let state = self.state.read();
        Ok(keys
            .iter()
            .filter_map(|k| state.datasets.get(k))
            .map(|d| state.dataset_data(d))
            .collect())
    }

    async fn latest_run_for(&self, run: EntityKey) -> Result<Option<RunSummary>> {
        Ok(self.state.read().runs.get(&run).map(|r| r.summary.clone()))
    }

    async fn latest_runs_for(
        &self,
        runs: &BTreeSet<EntityKey>,
    ) -> Result<BTreeMap<EntityKey, RunSummary>> {
        let state = self.state.read();
        Ok(runs
            .iter()
            .filter_map(|k| state.runs.get(k).map(|r| (*k, r.summary.clone())))
            .collect())
    }

    async fn out_edge_count_for_dataset(&self, dataset: EntityKey) -> Result<usize> {
        Ok(self
            .state
            .read()
            .jobs
            .values()
            .filter(|j| j.inputs.contains(&dataset))
            .count())
    }

    async fn upstream_runs(&self, run: EntityKey, depth: u32) -> Result<Vec<UpstreamRunRow>> {
        let state = self.state.read();
        let mut rows = Vec::new();
        let mut seen = BTreeSet::from([run]);
        let mut queue = VecDeque::from([(run, 0u32)]);

        while let Some((key, hop)) = queue.pop_front() {
            let Some(record) = state.runs.get(&key) else {
                continue;
            };
            let Some(job) = state.jobs.get(&record.summary.job) else {
                continue;
            };
            let job_summary = JobSummary {
                namespace: job.namespace.clone(),
                name: job.name.clone(),
                version: record.job_version,
            };
            let mut inputs = Vec::new();
            for version_key in &record.inputs {
                let Some(version) = state.dataset_versions.get(version_key) else {
                    continue;
                };
                let Some(dataset) = state.datasets.get(&version.dataset) else {
                    continue;
                };
                inputs.push(DatasetVersionSummary {
                    namespace: dataset.namespace.clone(),
                    name: dataset.name.clone(),
                    version: *version_key,
                });
                if let Some(producer) = version.run {
                    if hop < depth && seen.insert(producer) {
                        queue.push_back((producer, hop + 1));
                    }
                }
            }
            if inputs.is_empty() {
                rows.push(UpstreamRunRow {
                    job: job_summary,
                    run: record.summary.clone(),
                    input: None,
                });
            } else {
                rows.extend(inputs.into_iter().map(|input| UpstreamRunRow {
                    job: job_summary.clone(),
                    run: record.summary.clone(),
                    input: Some(input),
                }));
            }
        }
        Ok(rows)
    }

    async fn direct_upstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let state = self.state.read();
        let edges: BTreeSet<(EntityKey, FactKey)> = keys
            .iter()
            .flat_map(|k| state.upstream_edges(*k, as_of))
            .map(|f| (f.output_field, fact_key(f)))
            .collect();
        Ok(group_edges(&state, &edges))
    }

    async fn direct_downstream_fields(
        &self,
        keys: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let state = self.state.read();
        let mut rows: BTreeMap<(EntityKey, EntityKey), ColumnRelationshipRow> = BTreeMap::new();
        for key in keys {
            for fact in state.downstream_edges(*key, as_of) {
                let Some(link) = state.output_link(fact) else {
                    continue;
                };
                let slot = (*key, fact.input_version);
                if !rows.contains_key(&slot) {
                    let Some(field) = state.field_ref(*key, Some(fact.input_version)) else {
                        continue;
                    };
                    rows.insert(slot, ColumnRelationshipRow::new(field, state.field_type(*key)));
                }
                if let Some(row) = rows.get_mut(&slot) {
                    if !row.output_fields.contains(&link) {
                        row.output_fields.push(link);
                    }
                }
            }
        }
        Ok(rows
            .into_values()
            .map(|mut row| {
                row.output_fields.sort();
                row
            })
            .collect())
    }

    async fn column_lineage_for_datasets(
        &self,
        datasets: &[DatasetName],
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let state = self.state.read();
        let now = Utc::now();
        let edges: BTreeSet<(EntityKey, FactKey)> = datasets
            .iter()
            .filter_map(|n| state.dataset_by_name(&n.namespace, &n.name))
            .flat_map(|d| d.fields.iter().copied())
            .flat_map(|f| state.upstream_edges(f, now))
            .map(|f| (f.output_field, fact_key(f)))
            .collect();
        Ok(group_edges(&state, &edges))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FieldLineageQuery
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
impl FieldLineageQuery for InMemoryLineageStore {
    fn strategy_name(&self) -> &'static str {
        "in-memory bounded walk"
    }

    async fn multi_hop_field_lineage(
        &self,
        request: &FieldLineageRequest,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let state = Arc::clone(&self.state);
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let state = state.read();
            let mut edges: BTreeSet<(EntityKey, FactKey)> = BTreeSet::new();
            bounded_walk(&state, &request, WalkDirection::Upstream, &mut edges);
            if request.with_downstream {
                bounded_walk(&state, &request, WalkDirection::Downstream, &mut edges);
            }

            debug!(
                seeds = request.seeds.len(),
                depth = request.depth,
                edges = edges.len(),
                "in-memory multi-hop field walk finished"
            );
            group_edges(&state, &edges)
        })
        .await
        .map_err(|e| {
            StorageError::query(format!("in-memory field walk failed: {}", e)).with_source(e)
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum WalkDirection {
    Upstream,
    Downstream,
}

/// Breadth-first walk collecting every edge within `depth` hops of a seed
///
/// Each field is expanded once, at the fewest hops it is reached in. A
/// shortest path never repeats a pair, so this yields the same edges as
/// following every path that does not revisit a pair.
fn bounded_walk(
    state: &State,
    request: &FieldLineageRequest,
    direction: WalkDirection,
    edges: &mut BTreeSet<(EntityKey, FactKey)>,
) {
    let mut visited: BTreeSet<EntityKey> = request.seeds.clone();
    let mut queue: VecDeque<(EntityKey, u32)> = request.seeds.iter().map(|s| (*s, 0)).collect();

    while let Some((field, hop)) = queue.pop_front() {
        if hop >= request.depth {
            continue;
        }
        let facts = match direction {
            WalkDirection::Upstream => state.upstream_edges(field, request.as_of),
            WalkDirection::Downstream => state.downstream_edges(field, request.as_of),
        };
        for fact in facts {
            edges.insert((fact.output_field, fact_key(fact)));
            let next = match direction {
                WalkDirection::Upstream => fact.input_field,
                WalkDirection::Downstream => fact.output_field,
            };
            if visited.insert(next) {
                queue.push_back((next, hop + 1));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

//! Graph assembly
//!
//! Turns flat relationship rows into a `Lineage`. Endpoints that were only
//! mentioned by a row (never fetched themselves) get a minimal synthesized
//! node, so no edge can dangle. `include_version` is applied to every
//! `NodeId` built here, synthesized ones included.

use std::collections::{BTreeMap, BTreeSet};

use lineagegraph_store::{
    ColumnRelationshipRow, DatasetData, EntityKey, FieldRef, JobRelationshipRow, RunSummary,
};

use crate::graph::{Edge, FieldNodeData, JobData, Lineage, Node, NodeData};
use crate::node_id::NodeId;

// ═══════════════════════════════════════════════════════════════════════════
// Node ids
// ═══════════════════════════════════════════════════════════════════════════

pub fn field_node_id(field: &FieldRef, include_version: bool) -> NodeId {
    match (include_version, field.dataset_version) {
        (true, Some(version)) => NodeId::dataset_field_version(
            field.namespace.clone(),
            field.dataset.clone(),
            field.field.clone(),
            version.as_uuid(),
        ),
        _ => NodeId::dataset_field(
            field.namespace.clone(),
            field.dataset.clone(),
            field.field.clone(),
        ),
    }
}

fn dataset_node_id(dataset: &DatasetData, include_version: bool) -> NodeId {
    match (include_version, dataset.current_version) {
        (true, Some(version)) => NodeId::dataset_version(
            dataset.namespace.clone(),
            dataset.name.clone(),
            version.as_uuid(),
        ),
        _ => NodeId::dataset(dataset.namespace.clone(), dataset.name.clone()),
    }
}

fn job_node_id(job: &JobRelationshipRow, include_version: bool) -> NodeId {
    match (include_version, job.version) {
        (true, Some(version)) => {
            NodeId::job_version(job.namespace.clone(), job.name.clone(), version.as_uuid())
        }
        _ => NodeId::job(job.namespace.clone(), job.name.clone()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Job-level assembly
// ═══════════════════════════════════════════════════════════════════════════

/// Build a job/dataset graph
///
/// Dataset keys a job references but that are missing from `datasets` are
/// dropped from that job's edges and payload.
pub fn assemble_jobs(
    jobs: &[JobRelationshipRow],
    datasets: &[DatasetData],
    latest_runs: &BTreeMap<EntityKey, RunSummary>,
    include_version: bool,
) -> Lineage {
    let dataset_by_key: BTreeMap<EntityKey, &DatasetData> =
        datasets.iter().map(|d| (d.key, d)).collect();
    let mut job_by_key: BTreeMap<EntityKey, &JobRelationshipRow> = BTreeMap::new();
    for job in jobs {
        job_by_key.entry(job.key).or_insert(job);
    }

    // dataset key -> producing / consuming job ids
    let mut producers: BTreeMap<EntityKey, BTreeSet<NodeId>> = BTreeMap::new();
    let mut consumers: BTreeMap<EntityKey, BTreeSet<NodeId>> = BTreeMap::new();
    let mut nodes = Vec::with_capacity(job_by_key.len() + dataset_by_key.len());

    for job in job_by_key.values() {
        let job_id = job_node_id(job, include_version);
        let inputs: Vec<&DatasetData> = job
            .input_keys
            .iter()
            .filter_map(|k| dataset_by_key.get(k).copied())
            .collect();
        let outputs: Vec<&DatasetData> = job
            .output_keys
            .iter()
            .filter_map(|k| dataset_by_key.get(k).copied())
            .collect();

        for dataset in &inputs {
            consumers
                .entry(dataset.key)
                .or_default()
                .insert(job_id.clone());
        }
        for dataset in &outputs {
            producers
                .entry(dataset.key)
                .or_default()
                .insert(job_id.clone());
        }

        let in_edges = inputs
            .iter()
            .map(|d| Edge::new(dataset_node_id(d, include_version), job_id.clone()))
            .collect();
        let out_edges = outputs
            .iter()
            .map(|d| Edge::new(job_id.clone(), dataset_node_id(d, include_version)))
            .collect();

        let data = JobData {
            key: job.key,
            namespace: job.namespace.clone(),
            name: job.name.clone(),
            job_type: job.job_type.clone(),
            version: job.version,
            parent_job: job.parent_job,
            inputs: inputs.iter().map(|d| d.dataset_name()).collect(),
            outputs: outputs.iter().map(|d| d.dataset_name()).collect(),
            latest_run: job.current_run.and_then(|run| latest_runs.get(&run).cloned()),
            updated_at: job.updated_at,
        };
        nodes.push(
            Node::new(job_id, NodeData::Job(Box::new(data))).with_edges(in_edges, out_edges),
        );
    }

    for dataset in dataset_by_key.values() {
        let dataset_id = dataset_node_id(dataset, include_version);
        let in_edges = producers
            .get(&dataset.key)
            .into_iter()
            .flatten()
            .map(|job| Edge::new(job.clone(), dataset_id.clone()))
            .collect();
        let out_edges = consumers
            .get(&dataset.key)
            .into_iter()
            .flatten()
            .map(|job| Edge::new(dataset_id.clone(), job.clone()))
            .collect();
        nodes.push(
            Node::new(dataset_id, NodeData::Dataset(Box::new((*dataset).clone())))
                .with_edges(in_edges, out_edges),
        );
    }

    Lineage::new(nodes)
}

// ═══════════════════════════════════════════════════════════════════════════
// Column-level assembly
// ═══════════════════════════════════════════════════════════════════════════

/// Build a field graph from relationship rows plus the seed fields
///
/// Rows may describe edges through `input_fields` (`field <- input`) or
/// `output_fields` (`field -> output`); both land in the same indexes.
pub fn assemble_columns(
    rows: &[ColumnRelationshipRow],
    seeds: &[ColumnRelationshipRow],
    include_version: bool,
) -> Lineage {
    let mut payloads: BTreeMap<NodeId, FieldNodeData> = BTreeMap::new();
    // node -> origins of its in-edges / destinations of its out-edges
    let mut inputs_of: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
    let mut outputs_of: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();

    for row in rows {
        let id = field_node_id(&row.field, include_version);
        let payload = payloads
            .entry(id.clone())
            .or_insert_with(|| FieldNodeData::from_ref(&row.field, row.field_type.clone()));
        if payload.field_type.is_none() {
            payload.field_type = row.field_type.clone();
        }
        for link in &row.input_fields {
            if !payload.input_fields.contains(link) {
                payload.input_fields.push(link.clone());
            }
        }

        for link in &row.input_fields {
            let input_id = field_node_id(&link.field, include_version);
            inputs_of.entry(id.clone()).or_default().insert(input_id.clone());
            outputs_of.entry(input_id.clone()).or_default().insert(id.clone());
            payloads
                .entry(input_id)
                .or_insert_with(|| FieldNodeData::from_ref(&link.field, None));
        }
        for link in &row.output_fields {
            let output_id = field_node_id(&link.field, include_version);
            outputs_of.entry(id.clone()).or_default().insert(output_id.clone());
            inputs_of.entry(output_id.clone()).or_default().insert(id.clone());
            payloads
                .entry(output_id)
                .or_insert_with(|| FieldNodeData::from_ref(&link.field, None));
        }
    }

    for seed in seeds {
        let id = field_node_id(&seed.field, include_version);
        let payload = payloads
            .entry(id)
            .or_insert_with(|| FieldNodeData::from_ref(&seed.field, seed.field_type.clone()));
        if payload.field_type.is_none() {
            payload.field_type = seed.field_type.clone();
        }
    }

    let nodes = payloads.into_iter().map(|(id, mut payload)| {
        payload.input_fields.sort();
        let in_edges = inputs_of
            .get(&id)
            .into_iter()
            .flatten()
            .map(|origin| Edge::new(origin.clone(), id.clone()))
            .collect();
        let out_edges = outputs_of
            .get(&id)
            .into_iter()
            .flatten()
            .map(|destination| Edge::new(id.clone(), destination.clone()))
            .collect();
        Node::new(id, NodeData::DatasetField(payload)).with_edges(in_edges, out_edges)
    });

    Lineage::new(nodes)
}

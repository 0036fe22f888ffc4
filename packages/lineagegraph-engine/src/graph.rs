//! Public lineage graph model
//!
//! A `Lineage` is an immutable set of typed nodes sorted by `NodeId`. Edge
//! sets are `BTreeSet`s so an empty set always means "nothing discovered in
//! that direction".

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use lineagegraph_store::{
    DatasetData, DatasetName, DatasetVersionSummary, EntityKey, FieldLink, FieldRef, JobSummary,
    RunSummary, UpstreamRunRow,
};
use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;

// ═══════════════════════════════════════════════════════════════════════════
// Nodes and edges
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Job,
    Dataset,
    DatasetField,
}

/// Directed edge: `origin` produces or feeds `destination`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub origin: NodeId,
    pub destination: NodeId,
}

impl Edge {
    pub fn new(origin: NodeId, destination: NodeId) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

/// Job payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub key: EntityKey,
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub version: Option<EntityKey>,
    pub parent_job: Option<EntityKey>,
    pub inputs: BTreeSet<DatasetName>,
    pub outputs: BTreeSet<DatasetName>,
    pub latest_run: Option<RunSummary>,
    pub updated_at: DateTime<Utc>,
}

/// Dataset-field payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNodeData {
    pub namespace: String,
    pub dataset: String,
    pub dataset_version: Option<EntityKey>,
    pub field: String,
    pub field_type: Option<String>,
    pub input_fields: Vec<FieldLink>,
}

impl FieldNodeData {
    pub fn from_ref(field: &FieldRef, field_type: Option<String>) -> Self {
        Self {
            namespace: field.namespace.clone(),
            dataset: field.dataset.clone(),
            dataset_version: field.dataset_version,
            field: field.field.clone(),
            field_type,
            input_fields: Vec::new(),
        }
    }
}

/// Entity payload carried by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeData {
    Job(Box<JobData>),
    Dataset(Box<DatasetData>),
    DatasetField(FieldNodeData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub data: NodeData,
    pub in_edges: BTreeSet<Edge>,
    pub out_edges: BTreeSet<Edge>,
}

impl Node {
    pub fn new(id: NodeId, data: NodeData) -> Self {
        Self {
            node_type: id.node_type(),
            id,
            data,
            in_edges: BTreeSet::new(),
            out_edges: BTreeSet::new(),
        }
    }

    pub fn with_edges(mut self, in_edges: BTreeSet<Edge>, out_edges: BTreeSet<Edge>) -> Self {
        self.in_edges = in_edges;
        self.out_edges = out_edges;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lineage
// ═══════════════════════════════════════════════════════════════════════════

/// Lineage graph result, sorted by `NodeId`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    graph: Vec<Node>,
}

impl Lineage {
    /// Build from nodes; a later node with an id already seen is dropped
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut by_id: BTreeMap<NodeId, Node> = BTreeMap::new();
        for node in nodes {
            by_id.entry(node.id.clone()).or_insert(node);
        }
        Self {
            graph: by_id.into_values().collect(),
        }
    }

    /// Single dataset node with no edges
    pub fn orphan_dataset(dataset: DatasetData) -> Self {
        let id = NodeId::dataset(dataset.namespace.clone(), dataset.name.clone());
        Self::new([Node::new(id, NodeData::Dataset(Box::new(dataset)))])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.graph
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.graph
            .binary_search_by(|node| node.id.cmp(id))
            .ok()
            .map(|index| &self.graph[index])
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.graph.iter().map(|node| &node.id)
    }

    /// Every distinct edge, each reported once
    pub fn edges(&self) -> BTreeSet<&Edge> {
        self.graph
            .iter()
            .flat_map(|node| node.in_edges.iter().chain(node.out_edges.iter()))
            .collect()
    }

    /// Edges referencing a node absent from the graph; empty for any assembled result
    pub fn dangling_edges(&self) -> Vec<&Edge> {
        self.edges()
            .into_iter()
            .filter(|edge| !self.contains(&edge.origin) || !self.contains(&edge.destination))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Run lineage
// ═══════════════════════════════════════════════════════════════════════════

/// One run and the dataset versions it read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRun {
    pub job: JobSummary,
    pub run: RunSummary,
    pub inputs: Vec<DatasetVersionSummary>,
}

/// Runs upstream of a starting run, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRunLineage {
    pub runs: Vec<UpstreamRun>,
}

impl UpstreamRunLineage {
    /// Group flat rows by run, keeping first-seen order
    pub fn from_rows(rows: impl IntoIterator<Item = UpstreamRunRow>) -> Self {
        let mut runs: Vec<UpstreamRun> = Vec::new();
        let mut index: BTreeMap<EntityKey, usize> = BTreeMap::new();
        for row in rows {
            let slot = *index.entry(row.run.key).or_insert_with(|| {
                runs.push(UpstreamRun {
                    job: row.job.clone(),
                    run: row.run.clone(),
                    inputs: Vec::new(),
                });
                runs.len() - 1
            });
            if let Some(input) = row.input {
                if !runs[slot].inputs.contains(&input) {
                    runs[slot].inputs.push(input);
                }
            }
        }
        Self { runs }
    }
}

//! Domain models exchanged with the relationship store
//!
//! Every value here is an immutable, request-scoped fact: the store builds
//! them per query and the engine never writes them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════
// Keys and names
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque internal identifier of a job, dataset, field, version or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Uuid);

impl EntityKey {
    /// Generate a fresh random key
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntityKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for EntityKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace-qualified dataset name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetName {
    pub namespace: String,
    pub name: String,
}

impl DatasetName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Dataset payloads
// ═══════════════════════════════════════════════════════════════════════════

/// Field declared in a dataset schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
}

/// One input of a column, as attached to a dataset during enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineageInputField {
    pub namespace: String,
    pub dataset: String,
    pub field: String,
    pub transformation_description: Option<String>,
    pub transformation_type: Option<String>,
}

/// Column-level lineage summary of one dataset column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineage {
    pub name: String,
    pub input_fields: Vec<ColumnLineageInputField>,
}

/// Dataset entity payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetData {
    pub key: EntityKey,
    pub namespace: String,
    pub name: String,
    pub description: Option<String>,
    pub current_version: Option<EntityKey>,
    pub fields: Vec<FieldSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Filled in by column-lineage enrichment; `None` until then
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_lineage: Option<Vec<ColumnLineage>>,
}

impl DatasetData {
    pub fn dataset_name(&self) -> DatasetName {
        DatasetName::new(self.namespace.clone(), self.name.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Job / run payloads
// ═══════════════════════════════════════════════════════════════════════════

/// Run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    New,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl RunState {
    pub fn is_done(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Aborted)
    }
}

/// Run metadata attached to jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub key: EntityKey,
    pub job: EntityKey,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Job-level relationship row: one job with the datasets it reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRelationshipRow {
    pub key: EntityKey,
    pub namespace: String,
    pub name: String,
    pub job_type: Option<String>,
    /// Current job version, when the job has been versioned
    pub version: Option<EntityKey>,
    pub current_run: Option<EntityKey>,
    pub parent_job: Option<EntityKey>,
    pub input_keys: BTreeSet<EntityKey>,
    pub output_keys: BTreeSet<EntityKey>,
    pub updated_at: DateTime<Utc>,
}

impl JobRelationshipRow {
    /// Every dataset the job touches, inputs first
    pub fn dataset_keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.input_keys.iter().chain(self.output_keys.iter())
    }
}

/// Job identity inside an upstream run row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub namespace: String,
    pub name: String,
    pub version: Option<EntityKey>,
}

/// Dataset version read by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersionSummary {
    pub namespace: String,
    pub name: String,
    pub version: EntityKey,
}

/// Flat upstream-run row: one run and (at most) one of its inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRunRow {
    pub job: JobSummary,
    pub run: RunSummary,
    pub input: Option<DatasetVersionSummary>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Field-level payloads
// ═══════════════════════════════════════════════════════════════════════════

/// A dataset field as seen at a point in time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub key: EntityKey,
    pub namespace: String,
    pub dataset: String,
    pub field: String,
    pub dataset_version: Option<EntityKey>,
}

/// Edge endpoint of a column relationship, with the transformation applied
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLink {
    #[serde(flatten)]
    pub field: FieldRef,
    pub transformation_description: Option<String>,
    pub transformation_type: Option<String>,
}

/// Field-level relationship row
///
/// `input_fields` are the producers of `field`; `output_fields` its consumers
/// (only populated by downstream queries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRelationshipRow {
    pub field: FieldRef,
    pub field_type: Option<String>,
    pub input_fields: Vec<FieldLink>,
    pub output_fields: Vec<FieldLink>,
}

impl ColumnRelationshipRow {
    pub fn new(field: FieldRef, field_type: Option<String>) -> Self {
        Self {
            field,
            field_type,
            input_fields: Vec::new(),
            output_fields: Vec::new(),
        }
    }
}

/// Field keys resolved from a versioned entity, with the version's creation time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionedFieldKeys {
    pub keys: Vec<EntityKey>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Input of a column-lineage fact to record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLineageInput {
    pub dataset_version: EntityKey,
    pub field: EntityKey,
}

/// Parameters of a server-side, depth-limited field traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLineageRequest {
    pub seeds: BTreeSet<EntityKey>,
    pub depth: u32,
    pub with_downstream: bool,
    pub as_of: DateTime<Utc>,
}

//! Typed node identifiers
//!
//! Canonical text form (used for `Display`, `FromStr` and serde):
//!
//! ```text
//! job:<namespace>:<name>[#<version>]
//! dataset:<namespace>:<name>[#<version>]
//! datasetField:<namespace>:<dataset>:<field>[#<version>]
//! ```
//!
//! The namespace is everything up to the name separator, so it may itself
//! contain `:` (`postgres://db:5432`). Names and fields may not contain `:`
//! or `#`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LineageError;
use crate::graph::NodeType;

const JOB: &str = "job";
const DATASET: &str = "dataset";
const DATASET_FIELD: &str = "datasetField";

/// Identifier of a graph node
///
/// Equality is component-wise and the derived ordering is total, which is
/// what keeps assembled graphs deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeId {
    Job {
        namespace: String,
        name: String,
    },
    JobVersion {
        namespace: String,
        name: String,
        version: Uuid,
    },
    Dataset {
        namespace: String,
        name: String,
    },
    DatasetVersion {
        namespace: String,
        name: String,
        version: Uuid,
    },
    DatasetField {
        namespace: String,
        dataset: String,
        field: String,
    },
    DatasetFieldVersion {
        namespace: String,
        dataset: String,
        field: String,
        version: Uuid,
    },
}

impl NodeId {
    pub fn job(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Job {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn job_version(namespace: impl Into<String>, name: impl Into<String>, version: Uuid) -> Self {
        Self::JobVersion {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    pub fn dataset(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Dataset {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn dataset_version(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: Uuid,
    ) -> Self {
        Self::DatasetVersion {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    pub fn dataset_field(
        namespace: impl Into<String>,
        dataset: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::DatasetField {
            namespace: namespace.into(),
            dataset: dataset.into(),
            field: field.into(),
        }
    }

    pub fn dataset_field_version(
        namespace: impl Into<String>,
        dataset: impl Into<String>,
        field: impl Into<String>,
        version: Uuid,
    ) -> Self {
        Self::DatasetFieldVersion {
            namespace: namespace.into(),
            dataset: dataset.into(),
            field: field.into(),
            version,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Job { .. } | Self::JobVersion { .. } => NodeType::Job,
            Self::Dataset { .. } | Self::DatasetVersion { .. } => NodeType::Dataset,
            Self::DatasetField { .. } | Self::DatasetFieldVersion { .. } => NodeType::DatasetField,
        }
    }

    pub fn has_version(&self) -> bool {
        self.version().is_some()
    }

    pub fn version(&self) -> Option<Uuid> {
        match self {
            Self::JobVersion { version, .. }
            | Self::DatasetVersion { version, .. }
            | Self::DatasetFieldVersion { version, .. } => Some(*version),
            _ => None,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Job { namespace, .. }
            | Self::JobVersion { namespace, .. }
            | Self::Dataset { namespace, .. }
            | Self::DatasetVersion { namespace, .. }
            | Self::DatasetField { namespace, .. }
            | Self::DatasetFieldVersion { namespace, .. } => namespace,
        }
    }

    /// Same node with the version component dropped
    pub fn without_version(&self) -> Self {
        match self {
            Self::JobVersion {
                namespace, name, ..
            } => Self::job(namespace.clone(), name.clone()),
            Self::DatasetVersion {
                namespace, name, ..
            } => Self::dataset(namespace.clone(), name.clone()),
            Self::DatasetFieldVersion {
                namespace,
                dataset,
                field,
                ..
            } => Self::dataset_field(namespace.clone(), dataset.clone(), field.clone()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job { namespace, name } => write!(f, "{JOB}:{namespace}:{name}"),
            Self::JobVersion {
                namespace,
                name,
                version,
            } => write!(f, "{JOB}:{namespace}:{name}#{version}"),
            Self::Dataset { namespace, name } => write!(f, "{DATASET}:{namespace}:{name}"),
            Self::DatasetVersion {
                namespace,
                name,
                version,
            } => write!(f, "{DATASET}:{namespace}:{name}#{version}"),
            Self::DatasetField {
                namespace,
                dataset,
                field,
            } => write!(f, "{DATASET_FIELD}:{namespace}:{dataset}:{field}"),
            Self::DatasetFieldVersion {
                namespace,
                dataset,
                field,
                version,
            } => write!(f, "{DATASET_FIELD}:{namespace}:{dataset}:{field}#{version}"),
        }
    }
}

fn non_empty<'a>(part: &'a str, what: &str, raw: &str) -> Result<&'a str, LineageError> {
    if part.is_empty() {
        return Err(LineageError::invalid_node_id(format!("empty {what} in '{raw}'")));
    }
    Ok(part)
}

impl FromStr for NodeId {
    type Err = LineageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = raw
            .split_once(':')
            .ok_or_else(|| LineageError::invalid_node_id(format!("missing type prefix in '{raw}'")))?;

        let (body, version) = match rest.rsplit_once('#') {
            Some((body, version)) => {
                let version = Uuid::parse_str(version).map_err(|e| {
                    LineageError::invalid_node_id(format!("bad version in '{raw}': {e}"))
                })?;
                (body, Some(version))
            }
            None => (rest, None),
        };

        match kind {
            JOB | DATASET => {
                let (namespace, name) = body.rsplit_once(':').ok_or_else(|| {
                    LineageError::invalid_node_id(format!("expected <namespace>:<name> in '{raw}'"))
                })?;
                let namespace = non_empty(namespace, "namespace", raw)?;
                let name = non_empty(name, "name", raw)?;
                Ok(match (kind, version) {
                    (JOB, None) => Self::job(namespace, name),
                    (JOB, Some(v)) => Self::job_version(namespace, name, v),
                    (_, None) => Self::dataset(namespace, name),
                    (_, Some(v)) => Self::dataset_version(namespace, name, v),
                })
            }
            DATASET_FIELD => {
                let mut parts = body.rsplitn(3, ':');
                let (Some(field), Some(dataset), Some(namespace)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(LineageError::invalid_node_id(format!(
                        "expected <namespace>:<dataset>:<field> in '{raw}'"
                    )));
                };
                let namespace = non_empty(namespace, "namespace", raw)?;
                let dataset = non_empty(dataset, "dataset", raw)?;
                let field = non_empty(field, "field", raw)?;
                Ok(match version {
                    None => Self::dataset_field(namespace, dataset, field),
                    Some(v) => Self::dataset_field_version(namespace, dataset, field, v),
                })
            }
            other => Err(LineageError::invalid_node_id(format!(
                "unknown node type '{other}' in '{raw}'"
            ))),
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = LineageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_each_kind() {
        let v = Uuid::parse_str("6f1c1b1e-2a6c-4c55-9a57-5b7f3c1d2e3f").unwrap();
        let cases = [
            ("job:ns:etl", NodeId::job("ns", "etl")),
            ("dataset:ns:orders", NodeId::dataset("ns", "orders")),
            (
                "datasetField:ns:orders:total",
                NodeId::dataset_field("ns", "orders", "total"),
            ),
            (
                "job:ns:etl#6f1c1b1e-2a6c-4c55-9a57-5b7f3c1d2e3f",
                NodeId::job_version("ns", "etl", v),
            ),
            (
                "dataset:ns:orders#6f1c1b1e-2a6c-4c55-9a57-5b7f3c1d2e3f",
                NodeId::dataset_version("ns", "orders", v),
            ),
            (
                "datasetField:ns:orders:total#6f1c1b1e-2a6c-4c55-9a57-5b7f3c1d2e3f",
                NodeId::dataset_field_version("ns", "orders", "total", v),
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(raw.parse::<NodeId>().unwrap(), expected, "{raw}");
            assert_eq!(expected.to_string(), raw);
        }
    }

    #[test]
    fn test_namespace_may_contain_colons() {
        let id: NodeId = "datasetField:postgres://db:5432:public.orders:total"
            .parse()
            .unwrap();
        assert_eq!(
            id,
            NodeId::dataset_field("postgres://db:5432", "public.orders", "total")
        );
        assert_eq!(id.namespace(), "postgres://db:5432");
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in [
            "orders",
            "table:ns:orders",
            "job:etl",
            "dataset::orders",
            "datasetField:ns:orders",
            "job:ns:etl#not-a-uuid",
            "datasetField:ns::total",
        ] {
            let err = raw.parse::<NodeId>().unwrap_err();
            assert!(matches!(err, LineageError::InvalidNodeId(_)), "{raw}");
        }
    }

    #[test]
    fn test_version_helpers() {
        let v = Uuid::new_v4();
        let id = NodeId::dataset_field_version("ns", "orders", "total", v);
        assert!(id.has_version());
        assert_eq!(id.version(), Some(v));
        assert_eq!(id.without_version(), NodeId::dataset_field("ns", "orders", "total"));
        assert_eq!(id.node_type(), NodeType::DatasetField);
        assert!(!NodeId::job("ns", "etl").has_version());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let id = NodeId::dataset("ns", "orders");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dataset:ns:orders\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<NodeId>("\"bogus\"").is_err());
    }

    #[test]
    fn test_ordering_is_component_wise() {
        let a = NodeId::dataset_field("ns", "a", "z");
        let b = NodeId::dataset_field("ns", "b", "a");
        assert!(a < b);
        assert!(NodeId::job("ns", "x") < NodeId::dataset("ns", "a"));
    }

    fn namespace() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9:/._-]{0,12}"
    }

    fn name() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_.]{0,12}"
    }

    fn node_id() -> impl Strategy<Value = NodeId> {
        let version = any::<u128>().prop_map(Uuid::from_u128);
        prop_oneof![
            (namespace(), name()).prop_map(|(n, j)| NodeId::job(n, j)),
            (namespace(), name(), version.clone())
                .prop_map(|(n, j, v)| NodeId::job_version(n, j, v)),
            (namespace(), name()).prop_map(|(n, d)| NodeId::dataset(n, d)),
            (namespace(), name(), version.clone())
                .prop_map(|(n, d, v)| NodeId::dataset_version(n, d, v)),
            (namespace(), name(), name()).prop_map(|(n, d, f)| NodeId::dataset_field(n, d, f)),
            (namespace(), name(), name(), version)
                .prop_map(|(n, d, f, v)| NodeId::dataset_field_version(n, d, f, v)),
        ]
    }

    proptest! {
        #[test]
        fn prop_text_form_roundtrips(id in node_id()) {
            let parsed: NodeId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}

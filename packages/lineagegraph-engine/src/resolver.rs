//! Identifier resolution
//!
//! Maps a `NodeId` seed to the store keys a traversal starts from, plus the
//! point in time every later query must be evaluated at.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use lineagegraph_store::{DatasetData, EntityKey, LineageStore, VersionedFieldKeys};
use tracing::debug;

use crate::error::{LineageError, Result};
use crate::node_id::NodeId;
use crate::scope::RequestScope;

/// Field keys a column traversal starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFields {
    pub keys: BTreeSet<EntityKey>,
    pub as_of: DateTime<Utc>,
}

impl ResolvedFields {
    fn latest(keys: impl IntoIterator<Item = EntityKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            as_of: Utc::now(),
        }
    }

    fn versioned(found: VersionedFieldKeys) -> Self {
        Self {
            keys: found.keys.into_iter().collect(),
            as_of: found.created_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Starting point of a job-level traversal
#[derive(Debug, Clone, PartialEq)]
pub enum JobSeed {
    Job(EntityKey),
    /// Dataset seed; `job` is `None` when no job touches it
    Dataset {
        dataset: Box<DatasetData>,
        job: Option<EntityKey>,
    },
}

pub struct IdentifierResolver<'a> {
    store: &'a dyn LineageStore,
    scope: &'a RequestScope,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(store: &'a dyn LineageStore, scope: &'a RequestScope) -> Self {
        Self { store, scope }
    }

    /// Resolve any seed kind to field keys
    ///
    /// Unknown jobs and datasets resolve to an empty set like unknown fields
    /// do; the caller decides what empty means.
    pub async fn resolve_fields(&self, seed: &NodeId) -> Result<ResolvedFields> {
        let resolved = match seed {
            NodeId::Job { namespace, name } => {
                let keys = self
                    .scope
                    .call(self.store.field_keys_for_job(namespace, name))
                    .await?;
                ResolvedFields::latest(keys.unwrap_or_default())
            }
            NodeId::JobVersion { version, .. } => {
                let found = self
                    .scope
                    .call(self.store.field_keys_for_job_version(EntityKey::from_uuid(*version)))
                    .await?;
                ResolvedFields::versioned(found.unwrap_or_default())
            }
            NodeId::Dataset { namespace, name } => {
                let keys = self
                    .scope
                    .call(self.store.field_keys_for_dataset(namespace, name))
                    .await?;
                ResolvedFields::latest(keys.unwrap_or_default())
            }
            NodeId::DatasetVersion { version, .. } => {
                let found = self
                    .scope
                    .call(
                        self.store
                            .field_keys_for_dataset_version(EntityKey::from_uuid(*version)),
                    )
                    .await?;
                ResolvedFields::versioned(found.unwrap_or_default())
            }
            NodeId::DatasetField {
                namespace,
                dataset,
                field,
            } => {
                let key = self
                    .scope
                    .call(self.store.field_key_by_name(namespace, dataset, field))
                    .await?;
                ResolvedFields::latest(key)
            }
            NodeId::DatasetFieldVersion { field, version, .. } => {
                let found = self
                    .scope
                    .call(
                        self.store
                            .field_keys_for_dataset_field_version(field, EntityKey::from_uuid(*version)),
                    )
                    .await?;
                ResolvedFields::versioned(found.unwrap_or_default())
            }
        };
        debug!(
            "Resolved {} to {} field key(s) as of {}",
            seed,
            resolved.keys.len(),
            resolved.as_of
        );
        Ok(resolved)
    }

    /// Resolve a job or dataset seed for job-level traversal
    pub async fn resolve_job(&self, seed: &NodeId) -> Result<JobSeed> {
        match seed {
            NodeId::Job { namespace, name } => self
                .scope
                .call(self.store.find_job(namespace, name))
                .await?
                .map(JobSeed::Job)
                .ok_or_else(|| LineageError::not_found(seed)),
            NodeId::Dataset { namespace, name } => {
                let dataset = self
                    .scope
                    .call(self.store.find_dataset(namespace, name))
                    .await?
                    .ok_or_else(|| LineageError::not_found(seed))?;
                let job = self
                    .scope
                    .call(self.store.job_for_dataset(namespace, name))
                    .await?;
                debug!("Dataset seed {} resolved to job {:?}", seed, job);
                Ok(JobSeed::Dataset {
                    dataset: Box::new(dataset),
                    job,
                })
            }
            _ => Err(LineageError::unsupported_seed(format!(
                "{} is not a job or dataset",
                seed
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lineagegraph_store::InMemoryLineageStore;

    struct Fixture {
        store: InMemoryLineageStore,
        orders: EntityKey,
        total: EntityKey,
        job: EntityKey,
    }

    fn fixture() -> Fixture {
        let store = InMemoryLineageStore::new();
        let raw = store.add_dataset("ns", "raw");
        let orders = store.add_dataset("ns", "orders");
        store.add_field(raw, "amount", Some("INT")).unwrap();
        let total = store.add_field(orders, "total", Some("INT")).unwrap();
        store.add_field(orders, "id", Some("INT")).unwrap();
        let job = store.add_job("ns", "etl", &[raw], &[orders]).unwrap();
        Fixture {
            store,
            orders,
            total,
            job,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Field Resolution Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_resolve_field_by_name() {
        let f = fixture();
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let found = resolver
            .resolve_fields(&NodeId::dataset_field("ns", "orders", "total"))
            .await
            .unwrap();
        assert_eq!(found.keys, BTreeSet::from([f.total]));

        let missing = resolver
            .resolve_fields(&NodeId::dataset_field("ns", "orders", "nope"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_dataset_and_job() {
        let f = fixture();
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let dataset = resolver
            .resolve_fields(&NodeId::dataset("ns", "orders"))
            .await
            .unwrap();
        assert_eq!(dataset.keys.len(), 2);

        let job = resolver
            .resolve_fields(&NodeId::job("ns", "etl"))
            .await
            .unwrap();
        assert_eq!(job.keys.len(), 3);

        let unknown = resolver
            .resolve_fields(&NodeId::dataset("ns", "ghost"))
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_versioned_seed_uses_version_time() {
        let f = fixture();
        let at = Utc::now() - Duration::days(3);
        let version = f.store.add_dataset_version(f.orders, None, at).unwrap();
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let pinned = resolver
            .resolve_fields(&NodeId::dataset_field_version(
                "ns",
                "orders",
                "total",
                version.as_uuid(),
            ))
            .await
            .unwrap();
        assert_eq!(pinned.keys, BTreeSet::from([f.total]));
        assert_eq!(pinned.as_of, at);

        let whole = resolver
            .resolve_fields(&NodeId::dataset_version("ns", "orders", version.as_uuid()))
            .await
            .unwrap();
        assert_eq!(whole.keys.len(), 2);
        assert_eq!(whole.as_of, at);
    }

    #[tokio::test]
    async fn test_job_version_seed() {
        let f = fixture();
        let at = Utc::now() - Duration::hours(1);
        let version = f.store.add_job_version(f.job, at).unwrap();
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let found = resolver
            .resolve_fields(&NodeId::job_version("ns", "etl", version.as_uuid()))
            .await
            .unwrap();
        assert_eq!(found.keys.len(), 3);
        assert_eq!(found.as_of, at);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Job Seed Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_resolve_job_seed() {
        let f = fixture();
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let seed = resolver.resolve_job(&NodeId::job("ns", "etl")).await.unwrap();
        assert_eq!(seed, JobSeed::Job(f.job));

        let seed = resolver
            .resolve_job(&NodeId::dataset("ns", "orders"))
            .await
            .unwrap();
        assert!(matches!(seed, JobSeed::Dataset { job: Some(j), .. } if j == f.job));
    }

    #[tokio::test]
    async fn test_resolve_job_seed_errors() {
        let f = fixture();
        f.store.add_dataset("ns", "lonely");
        let scope = RequestScope::default();
        let resolver = IdentifierResolver::new(&f.store, &scope);

        let err = resolver
            .resolve_job(&NodeId::job("ns", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::NotFound(_)));

        let err = resolver
            .resolve_job(&NodeId::dataset_field("ns", "orders", "total"))
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::UnsupportedSeed(_)));

        let seed = resolver
            .resolve_job(&NodeId::dataset("ns", "lonely"))
            .await
            .unwrap();
        assert!(matches!(seed, JobSeed::Dataset { job: None, .. }));
    }
}

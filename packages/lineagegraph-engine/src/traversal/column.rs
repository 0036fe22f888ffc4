//! Column-level traversal
//!
//! Strategies run in order until one yields rows:
//! 1. federated single query (injected `FieldLineageQuery`)
//! 2. recursive single query (injected `FieldLineageQuery`)
//! 3. iterative per-level BFS over the store's direct field queries
//!
//! A failing or empty strategy falls through to the next. Cancellation never
//! does.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use lineagegraph_store::{
    ColumnRelationshipRow, EntityKey, FieldLineageQuery, FieldLineageRequest, LineageStore,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::resolver::ResolvedFields;
use crate::scope::RequestScope;
use crate::traversal::{Direction, TraversalFrontier};

/// An injected strategy with the label it is logged under
pub type LabelledStrategy<'a> = (&'static str, &'a dyn FieldLineageQuery);

pub struct ColumnTraversal<'a> {
    store: &'a dyn LineageStore,
    scope: &'a RequestScope,
    strategies: Vec<LabelledStrategy<'a>>,
}

impl<'a> ColumnTraversal<'a> {
    pub fn new(
        store: &'a dyn LineageStore,
        scope: &'a RequestScope,
        strategies: Vec<LabelledStrategy<'a>>,
    ) -> Self {
        Self {
            store,
            scope,
            strategies,
        }
    }

    /// Relationship rows within `depth` hops of the resolved seeds
    pub async fn traverse(
        &self,
        seeds: &ResolvedFields,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        if depth == 0 || seeds.is_empty() {
            return Ok(Vec::new());
        }

        let request = FieldLineageRequest {
            seeds: seeds.keys.clone(),
            depth,
            with_downstream,
            as_of: seeds.as_of,
        };
        for (label, strategy) in &self.strategies {
            match self.scope.call(strategy.multi_hop_field_lineage(&request)).await {
                Ok(rows) if !rows.is_empty() => {
                    info!(
                        "Column lineage from {} strategy ({}): {} row(s)",
                        label,
                        strategy.strategy_name(),
                        rows.len()
                    );
                    return Ok(rows);
                }
                Ok(_) => debug!("{} strategy returned no rows, falling back", label),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!("{} strategy failed, falling back: {}", label, e),
            }
        }

        let rows = self
            .iterative(&seeds.keys, seeds.as_of, depth, with_downstream)
            .await?;
        info!("Column lineage from iterative strategy: {} row(s)", rows.len());
        Ok(rows)
    }

    /// Baseline strategy: one store call per direction per level
    pub async fn iterative(
        &self,
        seeds: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
        depth: u32,
        with_downstream: bool,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let downstream = async {
            if with_downstream {
                self.walk(seeds, as_of, depth, Direction::Downstream).await
            } else {
                Ok(Vec::new())
            }
        };
        let (mut rows, downstream) = futures::try_join!(
            self.walk(seeds, as_of, depth, Direction::Upstream),
            downstream,
        )?;
        rows.extend(downstream);
        Ok(rows)
    }

    async fn walk(
        &self,
        seeds: &BTreeSet<EntityKey>,
        as_of: DateTime<Utc>,
        depth: u32,
        direction: Direction,
    ) -> Result<Vec<ColumnRelationshipRow>> {
        let mut frontier: TraversalFrontier<Vec<ColumnRelationshipRow>> =
            TraversalFrontier::new(seeds.iter().copied());

        while !frontier.is_exhausted(depth) {
            let fetched = match direction {
                Direction::Upstream => {
                    self.scope
                        .call(self.store.direct_upstream_fields(frontier.current_level(), as_of))
                        .await?
                }
                Direction::Downstream => {
                    self.scope
                        .call(self.store.direct_downstream_fields(frontier.current_level(), as_of))
                        .await?
                }
            };

            let mut by_field: BTreeMap<EntityKey, Vec<ColumnRelationshipRow>> = BTreeMap::new();
            let mut next = Vec::new();
            for row in fetched {
                let links = match direction {
                    Direction::Upstream => &row.input_fields,
                    Direction::Downstream => &row.output_fields,
                };
                next.extend(links.iter().map(|link| link.field.key));
                by_field.entry(row.field.key).or_default().push(row);
            }
            for (key, rows) in by_field {
                frontier.discover(key, rows);
            }

            let added = frontier.advance(next);
            debug!(
                "{} field level {}: {} new field(s)",
                direction,
                frontier.level(),
                added
            );
        }

        Ok(frontier.into_discovered().into_values().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use lineagegraph_store::{ColumnLineageInput, InMemoryLineageStore, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FieldLineageQuery for Failing {
        fn strategy_name(&self) -> &'static str {
            "failing"
        }

        async fn multi_hop_field_lineage(
            &self,
            _: &FieldLineageRequest,
        ) -> lineagegraph_store::Result<Vec<ColumnRelationshipRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::unavailable("federation down"))
        }
    }

    /// c.z <- b.y <- a.x, all recorded in one snapshot
    fn chain() -> (InMemoryLineageStore, [EntityKey; 3]) {
        let store = InMemoryLineageStore::new();
        let at = Utc::now() - Duration::minutes(5);
        let a = store.add_dataset("ns", "a");
        let b = store.add_dataset("ns", "b");
        let c = store.add_dataset("ns", "c");
        let x = store.add_field(a, "x", None).unwrap();
        let y = store.add_field(b, "y", None).unwrap();
        let z = store.add_field(c, "z", None).unwrap();
        let va = store.add_dataset_version(a, None, at).unwrap();
        let vb = store.add_dataset_version(b, None, at).unwrap();
        let vc = store.add_dataset_version(c, None, at).unwrap();
        let input = |version, field| ColumnLineageInput {
            dataset_version: version,
            field,
        };
        store
            .record_column_lineage(vb, y, &[input(va, x)], Some("copy"), None, at)
            .unwrap();
        store
            .record_column_lineage(vc, z, &[input(vb, y)], Some("copy"), None, at)
            .unwrap();
        (store, [x, y, z])
    }

    fn labelled<'a>(label: &'static str, query: &'a dyn FieldLineageQuery) -> LabelledStrategy<'a> {
        (label, query)
    }

    fn seeds(key: EntityKey) -> ResolvedFields {
        ResolvedFields {
            keys: BTreeSet::from([key]),
            as_of: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_iterative_respects_depth() {
        let (store, [_, _, z]) = chain();
        let scope = RequestScope::default();
        let traversal = ColumnTraversal::new(&store, &scope, Vec::new());

        let one = traversal.traverse(&seeds(z), 1, false).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].field.field, "z");

        let two = traversal.traverse(&seeds(z), 2, false).await.unwrap();
        assert_eq!(two.len(), 2);

        assert!(traversal.traverse(&seeds(z), 0, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_iterative_downstream() {
        let (store, [x, _, _]) = chain();
        let scope = RequestScope::default();
        let traversal = ColumnTraversal::new(&store, &scope, Vec::new());

        let upstream_only = traversal.traverse(&seeds(x), 5, false).await.unwrap();
        assert!(upstream_only.is_empty());

        let rows = traversal.traverse(&seeds(x), 5, true).await.unwrap();
        let mut consumers: Vec<&str> = rows
            .iter()
            .flat_map(|r| r.output_fields.iter().map(|l| l.field.field.as_str()))
            .collect();
        consumers.sort_unstable();
        assert_eq!(consumers, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_failing_strategy_falls_back() {
        let (store, [_, _, z]) = chain();
        let failing = Failing {
            calls: AtomicUsize::new(0),
        };
        let scope = RequestScope::default();
        let traversal = ColumnTraversal::new(
            &store,
            &scope,
            vec![labelled("federated", &failing), labelled("recursive", &failing)],
        );

        let rows = traversal.traverse(&seeds(z), 2, false).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_productive_strategy_wins() {
        let (store, [_, _, z]) = chain();
        let failing = Failing {
            calls: AtomicUsize::new(0),
        };
        let scope = RequestScope::default();
        let traversal = ColumnTraversal::new(
            &store,
            &scope,
            vec![labelled("federated", &store), labelled("recursive", &failing)],
        );

        let rows = traversal.traverse(&seeds(z), 2, false).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_fallback() {
        let (store, [_, _, z]) = chain();
        let scope = RequestScope::default();
        scope.token().cancel();
        let traversal = ColumnTraversal::new(&store, &scope, vec![labelled("federated", &store)]);

        let err = traversal.traverse(&seeds(z), 2, false).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}

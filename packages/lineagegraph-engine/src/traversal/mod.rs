//! Depth-limited traversals
//!
//! - `job`: job↔dataset lineage, accumulation and strict per-level modes
//! - `column`: field↔field lineage with strategy fallback
//!
//! Both drive a `TraversalFrontier`, owned by a single request direction.

pub mod column;
pub mod job;

use std::collections::{BTreeMap, BTreeSet};

use lineagegraph_store::EntityKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards producers
    Upstream,
    /// Towards consumers
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working state of one BFS run
#[derive(Debug, Clone)]
pub struct TraversalFrontier<R> {
    visited: BTreeSet<EntityKey>,
    current_level: BTreeSet<EntityKey>,
    discovered: BTreeMap<EntityKey, R>,
    level: u32,
}

impl<R> TraversalFrontier<R> {
    /// Start at level 0 with the seeds already visited
    pub fn new(seeds: impl IntoIterator<Item = EntityKey>) -> Self {
        let current_level: BTreeSet<EntityKey> = seeds.into_iter().collect();
        Self {
            visited: current_level.clone(),
            current_level,
            discovered: BTreeMap::new(),
            level: 0,
        }
    }

    pub fn current_level(&self) -> &BTreeSet<EntityKey> {
        &self.current_level
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_exhausted(&self, depth: u32) -> bool {
        self.current_level.is_empty() || self.level >= depth
    }

    pub fn is_visited(&self, key: &EntityKey) -> bool {
        self.visited.contains(key)
    }

    /// Record a row; the first row for a key wins
    pub fn discover(&mut self, key: EntityKey, row: R) {
        self.discovered.entry(key).or_insert(row);
    }

    /// Move to the next level: only keys not yet visited survive
    ///
    /// Returns how many keys made it into the new level.
    pub fn advance(&mut self, candidates: impl IntoIterator<Item = EntityKey>) -> usize {
        let next: BTreeSet<EntityKey> = candidates
            .into_iter()
            .filter(|key| self.visited.insert(*key))
            .collect();
        self.level += 1;
        self.current_level = next;
        self.current_level.len()
    }

    pub fn discovered(&self) -> &BTreeMap<EntityKey, R> {
        &self.discovered
    }

    pub fn into_discovered(self) -> BTreeMap<EntityKey, R> {
        self.discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_skips_visited() {
        let a = EntityKey::new();
        let b = EntityKey::new();
        let c = EntityKey::new();
        let mut frontier: TraversalFrontier<&str> = TraversalFrontier::new([a]);

        assert_eq!(frontier.advance([a, b]), 1);
        assert_eq!(frontier.current_level(), &BTreeSet::from([b]));
        assert_eq!(frontier.advance([a, b, c, c]), 1);
        assert_eq!(frontier.level(), 2);
        assert!(frontier.is_visited(&c));
        assert_eq!(frontier.advance([a, b, c]), 0);
        assert!(frontier.is_exhausted(10));
    }

    #[test]
    fn test_depth_exhaustion() {
        let mut frontier: TraversalFrontier<()> = TraversalFrontier::new([EntityKey::new()]);
        assert!(frontier.is_exhausted(0));
        assert!(!frontier.is_exhausted(1));
        frontier.advance([EntityKey::new()]);
        assert!(frontier.is_exhausted(1));
    }

    #[test]
    fn test_first_discovery_wins() {
        let a = EntityKey::new();
        let mut frontier = TraversalFrontier::new([a]);
        frontier.discover(a, "first");
        frontier.discover(a, "second");
        assert_eq!(frontier.discovered()[&a], "first");
        assert_eq!(frontier.into_discovered().len(), 1);
    }
}

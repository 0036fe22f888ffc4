//! Shared helpers for lineagegraph-engine integration tests
//!
//! Fixtures build small lineage worlds in an `InMemoryLineageStore`; the
//! store wrappers add latency, failures and call accounting.

#![allow(dead_code)]

mod fixtures;
mod stores;

pub use fixtures::*;
pub use stores::*;

/// Route engine logs to the test harness (`RUST_LOG=debug cargo test`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

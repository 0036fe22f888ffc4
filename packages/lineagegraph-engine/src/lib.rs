/*
 * Lineagegraph Engine - on-demand lineage graph reconstruction
 *
 * Read-side traversal over a relational fact store:
 * - Job/dataset lineage (store-side accumulation or strict per-level BFS)
 * - Column lineage (federated -> recursive -> iterative fallback)
 * - Deterministic, dangling-edge-free graph assembly
 *
 * The store is injected (`lineagegraph_store::LineageStore`) and only
 * borrowed for the duration of a request.
 */

// Public modules
pub mod assembler;
pub mod config;
pub mod error;
pub mod graph;
pub mod node_id;
pub mod resolver;
pub mod scope;
pub mod service;
pub mod traversal;

// Re-exports
pub use config::{ColumnConfig, ConfigError, LineageConfig, RequestConfig, TraversalConfig};
pub use error::{ErrorCategory, LineageError, Result};
pub use graph::{
    Edge, FieldNodeData, JobData, Lineage, Node, NodeData, NodeType, UpstreamRun,
    UpstreamRunLineage,
};
pub use node_id::NodeId;
pub use resolver::{IdentifierResolver, JobSeed, ResolvedFields};
pub use scope::RequestScope;
pub use service::{LineageRequest, LineageService, LineageServiceBuilder};
pub use traversal::{Direction, TraversalFrontier};

pub use lineagegraph_store::{
    DatasetData, DatasetName, EntityKey, FieldLineageQuery, InMemoryLineageStore, LineageStore,
    StorageError,
};

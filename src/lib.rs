//! bulkgraph: parallel bulk loader for property graphs
//!
//! Loads partitioned vertex records (each carrying its incident edges)
//! into a target graph store in three phases:
//!
//! 1. **vertex-write**: every vertex is written through a [`WritePolicy`];
//!    its new target id is announced to each incoming neighbour as a shell.
//! 2. **reconcile**: shells are grouped with the vertex they name, giving
//!    each vertex a source-to-target id map for its outgoing edges.
//! 3. **edge-write**: outgoing edges are written between resolved target
//!    vertices; unresolvable ones are counted and skipped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkgraph::{BulkLoader, LoadConfig, MemoryGraph};
//!
//! let graph = MemoryGraph::new();
//! let loader = BulkLoader::from_config(Arc::new(graph.clone()), LoadConfig::default())?;
//! let input = std::io::BufReader::new(std::fs::File::open("graph.json")?);
//! let report = loader.run_input(input)?;
//! println!("{}", report.counters);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod counters;
pub mod error;
pub mod graphson;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod store;

pub use config::LoadConfig;
pub use counters::{Counter, CountersSnapshot, JobCounters, WriteCounters};
pub use error::{LoadError, Result};
pub use pipeline::{BulkLoader, JobPlan, LoadReport, Phase};
pub use policy::{DefaultPolicy, KeyedMergePolicy, PolicyOp, PolicyRegistry, ResolvedPolicy, WritePolicy};
pub use record::{
    Direction, EdgeRecord, IdentifierMap, PropertyValue, ShellRecord, TaggedEnvelope, TargetId,
    VertexRecord, TARGET_ID_KEY, TERMINATOR_ID,
};
pub use store::{GraphStore, MemoryGraph, StoreFactory, StoredEdge, StoredVertex};

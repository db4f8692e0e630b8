//! Target graph store interface
//!
//! The pipeline writes into the target store only through [`GraphStore`]
//! connections. Each task opens its own connection from a [`StoreFactory`]
//! at setup and uses it from a single thread until cleanup.

pub mod memory;

pub use memory::{MemoryConnection, MemoryGraph};

use crate::error::Result;
use crate::record::{Direction, Properties, PropertyValue, TargetId};

/// A vertex as the target store sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVertex {
    pub id: TargetId,
    pub properties: Properties,
}

impl StoredVertex {
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// An edge as the target store sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub id: TargetId,
    pub label: String,
    pub out_vertex: TargetId,
    pub in_vertex: TargetId,
    pub properties: Properties,
}

impl StoredEdge {
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn vertex(&self, direction: Direction) -> TargetId {
        match direction {
            Direction::Out => self.out_vertex,
            Direction::In => self.in_vertex,
        }
    }
}

/// One connection to the target graph store.
///
/// A connection belongs to exactly one task and is never used from two
/// threads at once, hence `Send` but not `Sync`.
pub trait GraphStore: Send {
    // === VERTEX OPERATIONS ===

    /// Create an empty vertex. `hint` is the source identifier; stores may
    /// ignore it.
    fn create_vertex(&mut self, hint: Option<u64>) -> Result<TargetId>;

    /// Get a vertex by target id
    fn get_vertex(&self, id: TargetId) -> Result<Option<StoredVertex>>;

    /// Set (or overwrite) one vertex property
    fn set_vertex_property(&mut self, id: TargetId, key: &str, value: PropertyValue) -> Result<()>;

    /// Vertices whose `key` property equals `value`, ascending by id
    fn find_vertices(&self, key: &str, value: &PropertyValue) -> Result<Vec<TargetId>>;

    // === EDGE OPERATIONS ===

    /// Create an edge `out -[label]-> in`
    fn create_edge(&mut self, out: TargetId, in_: TargetId, label: &str) -> Result<TargetId>;

    /// Get an edge by target id
    fn get_edge(&self, id: TargetId) -> Result<Option<StoredEdge>>;

    /// Set (or overwrite) one edge property
    fn set_edge_property(&mut self, id: TargetId, key: &str, value: PropertyValue) -> Result<()>;

    /// Lowest-id edge `out -[label]-> in`, if any
    fn find_edge(&self, out: TargetId, in_: TargetId, label: &str) -> Result<Option<TargetId>>;

    // === TRANSACTIONS ===

    /// Capability flag. Rollback logic is gated on it, never on the
    /// concrete store type.
    fn supports_transactions(&self) -> bool;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    // === LIFECYCLE ===

    /// Release the connection. Any open transaction is discarded.
    fn shutdown(&mut self) -> Result<()>;
}

/// Opens store connections, one per task.
pub trait StoreFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn GraphStore>>;
}

/// Check whether `id` names a live vertex, via `get_vertex`.
pub fn vertex_exists(store: &dyn GraphStore, id: TargetId) -> Result<bool> {
    Ok(store.get_vertex(id)?.is_some())
}

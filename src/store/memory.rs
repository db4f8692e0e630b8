//! In-memory property graph used as a load target.
//!
//! `MemoryGraph` is a cheap-to-clone handle over shared state guarded by a
//! `RwLock`. Each [`MemoryConnection`] stages its writes in a private
//! buffer while a transaction is open: its own reads see them, nobody else
//! does until commit applies the whole buffer under one write lock.
//! Rollback drops the buffer.
//!
//! A graph built with [`MemoryGraph::non_transactional`] applies every write
//! immediately and refuses `begin`.
//!
//! Identifiers come from one atomic allocator shared by all connections, so
//! they are unique across concurrent tasks. Rolled-back identifiers are not
//! reused. Creation hints are ignored: target ids are independent of source
//! ids.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{LoadError, Result};
use crate::record::{Direction, Properties, PropertyValue, TargetId};
use crate::store::{GraphStore, StoreFactory, StoredEdge, StoredVertex};

/// Committed graph contents
#[derive(Default)]
struct GraphState {
    vertices: BTreeMap<TargetId, Properties>,
    edges: BTreeMap<TargetId, StoredEdge>,
    /// (out, in, label) -> edge ids, ascending
    edge_keys: HashMap<(TargetId, TargetId, String), Vec<TargetId>>,
}

impl GraphState {
    fn put_edge(&mut self, edge: StoredEdge) {
        let key = (edge.out_vertex, edge.in_vertex, edge.label.clone());
        let ids = self.edge_keys.entry(key).or_default();
        if let Err(pos) = ids.binary_search(&edge.id) {
            ids.insert(pos, edge.id);
        }
        self.edges.insert(edge.id, edge);
    }
}

struct Shared {
    state: RwLock<GraphState>,
    next_id: AtomicU64,
    transactional: bool,
    /// Number of upcoming writes that fail with a store error
    pending_failures: AtomicU64,
}

/// Shared in-memory graph. Clones refer to the same graph.
#[derive(Clone)]
pub struct MemoryGraph {
    shared: Arc<Shared>,
}

impl MemoryGraph {
    /// Create an empty transactional graph
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Create an empty graph that applies writes immediately
    pub fn non_transactional() -> Self {
        Self::build(false)
    }

    fn build(transactional: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(GraphState::default()),
                next_id: AtomicU64::new(1),
                transactional,
                pending_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.shared.transactional
    }

    /// Open a new connection
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            graph: self.clone(),
            staged: None,
            closed: false,
        }
    }

    /// Make the next `n` writes (creates, property sets, commits) fail.
    ///
    /// Used to exercise rollback and retry paths.
    pub fn fail_next_writes(&self, n: u64) {
        self.shared.pending_failures.store(n, Ordering::SeqCst);
    }

    fn alloc_id(&self) -> TargetId {
        TargetId(self.shared.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn check_fault(&self) -> Result<()> {
        let consumed = self
            .shared
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(LoadError::Store("injected write failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, GraphState> {
        self.shared.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.shared.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // === INSPECTION (committed state only) ===

    pub fn vertex_count(&self) -> usize {
        self.state().vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state().edges.len()
    }

    pub fn vertex(&self, id: TargetId) -> Option<StoredVertex> {
        self.state().vertices.get(&id).map(|properties| StoredVertex {
            id,
            properties: properties.clone(),
        })
    }

    /// All vertices, ascending by id
    pub fn vertices(&self) -> Vec<StoredVertex> {
        self.state()
            .vertices
            .iter()
            .map(|(id, properties)| StoredVertex { id: *id, properties: properties.clone() })
            .collect()
    }

    /// All edges, ascending by id
    pub fn edges(&self) -> Vec<StoredEdge> {
        self.state().edges.values().cloned().collect()
    }

    /// Edges incident to `id` in `direction` (`Out` = edges leaving `id`)
    pub fn edges_of(&self, id: TargetId, direction: Direction) -> Vec<StoredEdge> {
        self.state()
            .edges
            .values()
            .filter(|e| e.vertex(direction) == id)
            .cloned()
            .collect()
    }

    pub fn out_degree(&self, id: TargetId) -> usize {
        self.edges_of(id, Direction::Out).len()
    }

    pub fn in_degree(&self, id: TargetId) -> usize {
        self.edges_of(id, Direction::In).len()
    }

    /// Committed vertices whose `key` property equals `value`
    pub fn find_vertices(&self, key: &str, value: &PropertyValue) -> Vec<TargetId> {
        self.state()
            .vertices
            .iter()
            .filter(|(_, props)| props.get(key) == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreFactory for MemoryGraph {
    fn open(&self) -> Result<Box<dyn GraphStore>> {
        Ok(Box::new(self.connect()))
    }
}

/// Writes buffered by an open transaction. Modified committed elements are
/// copied in whole, so a staged entry always shadows the committed one.
#[derive(Default)]
struct StagedWrites {
    vertices: BTreeMap<TargetId, Properties>,
    edges: BTreeMap<TargetId, StoredEdge>,
}

/// One connection to a [`MemoryGraph`]
pub struct MemoryConnection {
    graph: MemoryGraph,
    staged: Option<StagedWrites>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(LoadError::Store("connection is shut down".to_string()));
        }
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    fn lookup_vertex(&self, id: TargetId) -> Option<Properties> {
        if let Some(props) = self.staged.as_ref().and_then(|s| s.vertices.get(&id)) {
            return Some(props.clone());
        }
        self.graph.state().vertices.get(&id).cloned()
    }

    fn vertex_known(&self, id: TargetId) -> bool {
        self.staged.as_ref().is_some_and(|s| s.vertices.contains_key(&id))
            || self.graph.state().vertices.contains_key(&id)
    }

    fn lookup_edge(&self, id: TargetId) -> Option<StoredEdge> {
        if let Some(edge) = self.staged.as_ref().and_then(|s| s.edges.get(&id)) {
            return Some(edge.clone());
        }
        self.graph.state().edges.get(&id).cloned()
    }
}

impl GraphStore for MemoryConnection {
    fn create_vertex(&mut self, _hint: Option<u64>) -> Result<TargetId> {
        self.ensure_open()?;
        self.graph.check_fault()?;
        let id = self.graph.alloc_id();
        match self.staged.as_mut() {
            Some(staged) => {
                staged.vertices.insert(id, Properties::new());
            }
            None => {
                self.graph.state_mut().vertices.insert(id, Properties::new());
            }
        }
        Ok(id)
    }

    fn get_vertex(&self, id: TargetId) -> Result<Option<StoredVertex>> {
        self.ensure_open()?;
        Ok(self.lookup_vertex(id).map(|properties| StoredVertex { id, properties }))
    }

    fn set_vertex_property(&mut self, id: TargetId, key: &str, value: PropertyValue) -> Result<()> {
        self.ensure_open()?;
        self.graph.check_fault()?;
        if self.staged.is_some() {
            let current = self.lookup_vertex(id).ok_or(LoadError::VertexNotFound(id))?;
            if let Some(staged) = self.staged.as_mut() {
                staged
                    .vertices
                    .entry(id)
                    .or_insert(current)
                    .insert(key.to_string(), value);
            }
        } else {
            let mut state = self.graph.state_mut();
            let props = state.vertices.get_mut(&id).ok_or(LoadError::VertexNotFound(id))?;
            props.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn find_vertices(&self, key: &str, value: &PropertyValue) -> Result<Vec<TargetId>> {
        self.ensure_open()?;
        let mut found: Vec<TargetId> = Vec::new();
        let staged = self.staged.as_ref();
        {
            let state = self.graph.state();
            for (id, props) in &state.vertices {
                if staged.is_some_and(|s| s.vertices.contains_key(id)) {
                    continue;
                }
                if props.get(key) == Some(value) {
                    found.push(*id);
                }
            }
        }
        if let Some(staged) = staged {
            for (id, props) in &staged.vertices {
                if props.get(key) == Some(value) {
                    found.push(*id);
                }
            }
        }
        found.sort_unstable();
        Ok(found)
    }

    fn create_edge(&mut self, out: TargetId, in_: TargetId, label: &str) -> Result<TargetId> {
        self.ensure_open()?;
        self.graph.check_fault()?;
        for endpoint in [out, in_] {
            if !self.vertex_known(endpoint) {
                return Err(LoadError::VertexNotFound(endpoint));
            }
        }
        let edge = StoredEdge {
            id: self.graph.alloc_id(),
            label: label.to_string(),
            out_vertex: out,
            in_vertex: in_,
            properties: Properties::new(),
        };
        let id = edge.id;
        match self.staged.as_mut() {
            Some(staged) => {
                staged.edges.insert(id, edge);
            }
            None => self.graph.state_mut().put_edge(edge),
        }
        Ok(id)
    }

    fn get_edge(&self, id: TargetId) -> Result<Option<StoredEdge>> {
        self.ensure_open()?;
        Ok(self.lookup_edge(id))
    }

    fn set_edge_property(&mut self, id: TargetId, key: &str, value: PropertyValue) -> Result<()> {
        self.ensure_open()?;
        self.graph.check_fault()?;
        if self.staged.is_some() {
            let current = self.lookup_edge(id).ok_or(LoadError::EdgeNotFound(id))?;
            if let Some(staged) = self.staged.as_mut() {
                staged
                    .edges
                    .entry(id)
                    .or_insert(current)
                    .properties
                    .insert(key.to_string(), value);
            }
        } else {
            let mut state = self.graph.state_mut();
            let edge = state.edges.get_mut(&id).ok_or(LoadError::EdgeNotFound(id))?;
            edge.properties.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn find_edge(&self, out: TargetId, in_: TargetId, label: &str) -> Result<Option<TargetId>> {
        self.ensure_open()?;
        let committed = self
            .graph
            .state()
            .edge_keys
            .get(&(out, in_, label.to_string()))
            .and_then(|ids| ids.first().copied());
        let staged = self.staged.as_ref().and_then(|s| {
            s.edges
                .values()
                .find(|e| e.out_vertex == out && e.in_vertex == in_ && e.label == label)
                .map(|e| e.id)
        });
        Ok(match (committed, staged) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    fn supports_transactions(&self) -> bool {
        self.graph.is_transactional()
    }

    fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.graph.is_transactional() {
            return Err(LoadError::Store("store does not support transactions".to_string()));
        }
        if self.staged.is_some() {
            return Err(LoadError::TransactionInProgress);
        }
        self.staged = Some(StagedWrites::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.staged.is_none() {
            return Err(LoadError::NoTransaction);
        }
        self.graph.check_fault()?;
        let staged = self.staged.take().ok_or(LoadError::NoTransaction)?;

        let mut state = self.graph.state_mut();
        for (id, props) in staged.vertices {
            state.vertices.insert(id, props);
        }
        for (_, edge) in staged.edges {
            state.put_edge(edge);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged.take().map(|_| ()).ok_or(LoadError::NoTransaction)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.staged = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_autocommit_writes_are_visible() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();

        let a = conn.create_vertex(None).unwrap();
        conn.set_vertex_property(a, "name", "marko".into()).unwrap();

        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.vertex(a).unwrap().property("name"), Some(&"marko".into()));
    }

    #[test]
    fn test_commit_publishes_staged_writes() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        conn.begin().unwrap();

        let a = conn.create_vertex(Some(1)).unwrap();
        let b = conn.create_vertex(Some(2)).unwrap();
        let e = conn.create_edge(a, b, "knows").unwrap();
        conn.set_edge_property(e, "weight", 0.5.into()).unwrap();

        // Own reads see staged writes, the graph does not
        assert!(conn.get_vertex(a).unwrap().is_some());
        assert_eq!(graph.vertex_count(), 0);
        assert_eq!(graph.edge_count(), 0);

        conn.commit().unwrap();

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.out_degree(a), 1);
        assert_eq!(graph.in_degree(b), 1);
        assert_eq!(graph.edges()[0].property("weight"), Some(&PropertyValue::Float(0.5)));
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        conn.begin().unwrap();
        conn.create_vertex(None).unwrap();
        conn.rollback().unwrap();

        assert_eq!(graph.vertex_count(), 0);
        assert!(matches!(conn.rollback(), Err(LoadError::NoTransaction)));
    }

    #[test]
    fn test_staged_property_update_shadows_committed_vertex() {
        let graph = MemoryGraph::new();
        let mut setup = graph.connect();
        let a = setup.create_vertex(None).unwrap();
        setup.set_vertex_property(a, "name", "marko".into()).unwrap();

        let mut conn = graph.connect();
        conn.begin().unwrap();
        conn.set_vertex_property(a, "age", 29.into()).unwrap();

        let staged = conn.get_vertex(a).unwrap().unwrap();
        assert_eq!(staged.properties.len(), 2);
        assert_eq!(graph.vertex(a).unwrap().properties.len(), 1);

        conn.rollback().unwrap();
        assert_eq!(graph.vertex(a).unwrap().properties.len(), 1);
    }

    #[test]
    fn test_find_vertices_merges_staged_and_committed() {
        let graph = MemoryGraph::new();
        let mut setup = graph.connect();
        let a = setup.create_vertex(None).unwrap();
        setup.set_vertex_property(a, "name", "marko".into()).unwrap();

        let mut conn = graph.connect();
        conn.begin().unwrap();
        let b = conn.create_vertex(None).unwrap();
        conn.set_vertex_property(b, "name", "marko".into()).unwrap();
        // Staged overwrite hides the committed match
        conn.set_vertex_property(a, "name", "peter".into()).unwrap();

        let found = conn.find_vertices("name", &"marko".into()).unwrap();
        assert_eq!(found, vec![b]);
        assert_eq!(graph.find_vertices("name", &"marko".into()), vec![a]);
    }

    #[test]
    fn test_find_edge_returns_lowest_id() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        let a = conn.create_vertex(None).unwrap();
        let b = conn.create_vertex(None).unwrap();
        let e1 = conn.create_edge(a, b, "knows").unwrap();
        conn.create_edge(a, b, "knows").unwrap();

        assert_eq!(conn.find_edge(a, b, "knows").unwrap(), Some(e1));
        assert_eq!(conn.find_edge(b, a, "knows").unwrap(), None);
        assert_eq!(conn.find_edge(a, b, "created").unwrap(), None);
    }

    #[test]
    fn test_create_edge_requires_endpoints() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        let a = conn.create_vertex(None).unwrap();

        let err = conn.create_edge(a, TargetId(999), "knows").unwrap_err();
        assert!(matches!(err, LoadError::VertexNotFound(TargetId(999))));
    }

    #[test]
    fn test_non_transactional_store_refuses_begin() {
        let graph = MemoryGraph::non_transactional();
        let mut conn = graph.connect();

        assert!(!conn.supports_transactions());
        assert!(conn.begin().is_err());
        conn.create_vertex(None).unwrap();
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn test_double_begin_rejected() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        conn.begin().unwrap();
        assert!(matches!(conn.begin(), Err(LoadError::TransactionInProgress)));
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        graph.fail_next_writes(2);

        assert!(conn.create_vertex(None).is_err());
        assert!(conn.create_vertex(None).is_err());
        assert!(conn.create_vertex(None).is_ok());
    }

    #[test]
    fn test_shutdown_closes_connection_and_discards_transaction() {
        let graph = MemoryGraph::new();
        let mut conn = graph.connect();
        conn.begin().unwrap();
        conn.create_vertex(None).unwrap();
        conn.shutdown().unwrap();

        assert_eq!(graph.vertex_count(), 0);
        assert!(conn.create_vertex(None).is_err());
    }

    #[test]
    fn test_concurrent_connections_allocate_unique_ids() {
        let graph = MemoryGraph::new();
        let mut handles = vec![];

        for _ in 0..8 {
            let g = graph.clone();
            handles.push(thread::spawn(move || {
                let mut conn = g.connect();
                conn.begin().unwrap();
                let ids: Vec<TargetId> = (0..100).map(|_| conn.create_vertex(None).unwrap()).collect();
                conn.commit().unwrap();
                ids
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(graph.vertex_count(), 800);
    }
}

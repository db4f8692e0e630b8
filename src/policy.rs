//! Write policies: the pluggable get-or-create decision.
//!
//! A [`WritePolicy`] decides, per vertex and per edge, whether to create a
//! fresh element in the target store or merge into an existing one. The
//! orchestrator never talks to the store about elements directly; every
//! vertex and edge write goes through the policy.
//!
//! Policies may implement only one of the two operations. Each task probes
//! the configured policy once at setup ([`ResolvedPolicy::probe`]) and uses
//! [`DefaultPolicy`] for any operation the policy does not provide, for the
//! rest of the task's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::counters::{Counter, WriteCounters};
use crate::error::{LoadError, Result};
use crate::record::{EdgeRecord, VertexRecord, TargetId};
use crate::store::GraphStore;

/// The two operations a policy can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyOp {
    GetOrCreateVertex,
    GetOrCreateEdge,
}

impl PolicyOp {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyOp::GetOrCreateVertex => "get_or_create_vertex",
            PolicyOp::GetOrCreateEdge => "get_or_create_edge",
        }
    }
}

/// Strategy deciding whether to insert or merge.
///
/// Implementations run inside the task's transaction; any error they return
/// aborts the task attempt exactly like a store failure.
pub trait WritePolicy: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Whether this policy implements `op`. Probed once per task.
    fn provides(&self, op: PolicyOp) -> bool;

    /// Resolve `vertex` to a target vertex, creating it if needed.
    fn get_or_create_vertex(
        &self,
        vertex: &VertexRecord,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        let _ = (vertex, store, counters);
        Err(self.missing(PolicyOp::GetOrCreateVertex))
    }

    /// Resolve `edge` between two resolved target vertices, creating it if needed.
    fn get_or_create_edge(
        &self,
        edge: &EdgeRecord,
        out: TargetId,
        in_: TargetId,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        let _ = (edge, out, in_, store, counters);
        Err(self.missing(PolicyOp::GetOrCreateEdge))
    }

    fn missing(&self, op: PolicyOp) -> LoadError {
        LoadError::MissingOperation { policy: self.name().to_string(), op: op.name() }
    }
}

/// Create a new vertex carrying every source property verbatim.
pub fn create_vertex_copy(
    vertex: &VertexRecord,
    store: &mut dyn GraphStore,
    counters: &mut WriteCounters,
) -> Result<TargetId> {
    let id = store.create_vertex(Some(vertex.id))?;
    counters.increment(Counter::VerticesWritten, 1);
    for (key, value) in &vertex.properties {
        store.set_vertex_property(id, key, value.clone())?;
        counters.increment(Counter::VertexPropertiesWritten, 1);
    }
    Ok(id)
}

/// Create a new edge carrying every source property verbatim.
pub fn create_edge_copy(
    edge: &EdgeRecord,
    out: TargetId,
    in_: TargetId,
    store: &mut dyn GraphStore,
    counters: &mut WriteCounters,
) -> Result<TargetId> {
    let id = store.create_edge(out, in_, &edge.label)?;
    counters.increment(Counter::EdgesWritten, 1);
    for (key, value) in &edge.properties {
        store.set_edge_property(id, key, value.clone())?;
        counters.increment(Counter::EdgePropertiesWritten, 1);
    }
    Ok(id)
}

/// Always create, copying every property.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl WritePolicy for DefaultPolicy {
    fn name(&self) -> &str {
        "default"
    }

    fn provides(&self, _op: PolicyOp) -> bool {
        true
    }

    fn get_or_create_vertex(
        &self,
        vertex: &VertexRecord,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        create_vertex_copy(vertex, store, counters)
    }

    fn get_or_create_edge(
        &self,
        edge: &EdgeRecord,
        out: TargetId,
        in_: TargetId,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        create_edge_copy(edge, out, in_, store, counters)
    }
}

/// Merge vertices that agree on one property key, and edges that agree on
/// (out, in, label). Matched elements receive the union of properties, with
/// incoming values winning on shared keys. Unmatched elements are created.
///
/// Supports incremental loads into a store that already holds a prior run.
#[derive(Debug, Clone)]
pub struct KeyedMergePolicy {
    key: String,
}

impl KeyedMergePolicy {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl WritePolicy for KeyedMergePolicy {
    fn name(&self) -> &str {
        "merge-by-key"
    }

    fn provides(&self, _op: PolicyOp) -> bool {
        true
    }

    fn get_or_create_vertex(
        &self,
        vertex: &VertexRecord,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        let Some(value) = vertex.property(&self.key) else {
            return create_vertex_copy(vertex, store, counters);
        };
        let Some(existing) = store.find_vertices(&self.key, value)?.first().copied() else {
            return create_vertex_copy(vertex, store, counters);
        };

        counters.increment(Counter::VerticesRetrieved, 1);
        let current = store.get_vertex(existing)?.ok_or(LoadError::VertexNotFound(existing))?;
        for (key, value) in &vertex.properties {
            if current.property(key) != Some(value) {
                store.set_vertex_property(existing, key, value.clone())?;
                counters.increment(Counter::VertexPropertiesWritten, 1);
            }
        }
        Ok(existing)
    }

    fn get_or_create_edge(
        &self,
        edge: &EdgeRecord,
        out: TargetId,
        in_: TargetId,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        let Some(existing) = store.find_edge(out, in_, &edge.label)? else {
            return create_edge_copy(edge, out, in_, store, counters);
        };

        let current = store.get_edge(existing)?.ok_or(LoadError::EdgeNotFound(existing))?;
        for (key, value) in &edge.properties {
            if current.property(key) != Some(value) {
                store.set_edge_property(existing, key, value.clone())?;
                counters.increment(Counter::EdgePropertiesWritten, 1);
            }
        }
        Ok(existing)
    }
}

/// Policy bound to one task after probing.
///
/// Built once at task setup and threaded through the task; there is no
/// process-wide policy state.
#[derive(Clone)]
pub struct ResolvedPolicy {
    vertex: Arc<dyn WritePolicy>,
    edge: Arc<dyn WritePolicy>,
}

impl ResolvedPolicy {
    /// Probe `policy` for both operations, substituting [`DefaultPolicy`]
    /// for any it does not provide.
    pub fn probe(policy: Arc<dyn WritePolicy>) -> Self {
        let fallback = |op: PolicyOp| -> Arc<dyn WritePolicy> {
            if policy.provides(op) {
                Arc::clone(&policy)
            } else {
                debug!(policy = policy.name(), op = op.name(), "operation not provided, using default");
                Arc::new(DefaultPolicy)
            }
        };
        Self {
            vertex: fallback(PolicyOp::GetOrCreateVertex),
            edge: fallback(PolicyOp::GetOrCreateEdge),
        }
    }

    /// Name of the policy serving `op`
    pub fn name_for(&self, op: PolicyOp) -> &str {
        match op {
            PolicyOp::GetOrCreateVertex => self.vertex.name(),
            PolicyOp::GetOrCreateEdge => self.edge.name(),
        }
    }

    pub fn get_or_create_vertex(
        &self,
        vertex: &VertexRecord,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        self.vertex.get_or_create_vertex(vertex, store, counters)
    }

    pub fn get_or_create_edge(
        &self,
        edge: &EdgeRecord,
        out: TargetId,
        in_: TargetId,
        store: &mut dyn GraphStore,
        counters: &mut WriteCounters,
    ) -> Result<TargetId> {
        self.edge.get_or_create_edge(edge, out, in_, store, counters)
    }
}

/// Policies addressable by name from configuration.
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn WritePolicy>>,
}

impl PolicyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self { policies: HashMap::new() }
    }

    /// Registry holding `default` and `merge-by-key` (matching on `merge_key`)
    pub fn with_builtins(merge_key: &str) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DefaultPolicy));
        registry.register(Arc::new(KeyedMergePolicy::new(merge_key)));
        registry
    }

    /// Register a policy under its own name, replacing any previous one
    pub fn register(&mut self, policy: Arc<dyn WritePolicy>) {
        self.policies.insert(policy.name().to_string(), policy);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn WritePolicy>> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::UnknownPolicy(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

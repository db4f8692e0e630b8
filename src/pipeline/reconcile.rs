//! Phase 2: gather shells next to the vertex they describe.
//!
//! Every envelope keyed by a source id lands in the same reduce call. The
//! shells say where each outgoing neighbour was written; folding them into
//! an [`IdentifierMap`] lets the edge phase connect the vertex without any
//! store lookups by source id.

use std::collections::BTreeMap;

use tracing::{error, warn};

use crate::counters::{Counter, WriteCounters};
use crate::error::{LoadError, Result};
use crate::record::{IdentifierMap, TaggedEnvelope, VertexRecord, TARGET_ID_KEY};

/// Reconcile one key. Input order does not affect the result.
///
/// Returns `None` (and counts `NULL_VERTICES_IGNORED`) when no vertex
/// record arrived for `key`, i.e. only neighbours mention it. A second
/// vertex record means the source id was written twice and fails with
/// [`LoadError::DuplicateVertex`].
pub fn reduce<I>(key: u64, envelopes: I, counters: &mut WriteCounters) -> Result<Option<VertexRecord>>
where
    I: IntoIterator<Item = TaggedEnvelope>,
{
    let mut id_map = IdentifierMap::new();
    let mut written: Option<VertexRecord> = None;

    for envelope in envelopes {
        match envelope {
            TaggedEnvelope::Shell(shell) => {
                if !id_map.record(shell) {
                    warn!(key, source_id = shell.source_id, "conflicting target ids for neighbour");
                }
            }
            TaggedEnvelope::Vertex(vertex) => {
                if written.is_some() {
                    error!(key, "source vertex written twice");
                    return Err(LoadError::DuplicateVertex(key));
                }
                written = Some(vertex);
            }
        }
    }

    let Some(vertex) = written else {
        warn!(key, "no source vertex");
        counters.increment(Counter::NullVerticesIgnored, 1);
        return Ok(None);
    };

    let mut reconciled = VertexRecord::new(vertex.id);
    if let Some(target) = vertex.properties.get(TARGET_ID_KEY) {
        reconciled.properties.insert(TARGET_ID_KEY.to_string(), target.clone());
    }
    reconciled.out_edges = vertex.out_edges;
    reconciled.id_map = Some(id_map);
    Ok(Some(reconciled))
}

/// Reduce one partition, keys ascending.
pub fn run_partition(
    groups: BTreeMap<u64, Vec<TaggedEnvelope>>,
    counters: &mut WriteCounters,
) -> Result<Vec<VertexRecord>> {
    let mut out = Vec::with_capacity(groups.len());
    for (key, envelopes) in groups {
        if let Some(vertex) = reduce(key, envelopes, counters)? {
            out.push(vertex);
        }
    }
    Ok(out)
}

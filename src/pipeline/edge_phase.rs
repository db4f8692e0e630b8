//! Phase 3: connect reconciled vertices.

use tracing::{debug, warn};

use crate::counters::Counter;
use crate::error::Result;
use crate::pipeline::task::TaskContext;
use crate::record::{TargetId, VertexRecord};

/// Write the outgoing edges of one reconciled vertex and return its terminator.
///
/// A vertex whose own target id is missing or no longer in the store is
/// skipped whole (`NULL_VERTICES_IGNORED`). An edge whose head is absent
/// from the identifier map, or mapped to a vertex the store does not have,
/// is skipped alone (`NULL_VERTEX_EDGES_IGNORED`). Neither aborts the task.
pub fn map_vertex(vertex: &VertexRecord, ctx: &mut TaskContext<'_>) -> Result<VertexRecord> {
    let Some(source) = resolve(ctx, vertex.target_id())? else {
        warn!(source_id = vertex.id, target = ?vertex.target_id(), "no source vertex");
        ctx.increment(Counter::NullVerticesIgnored);
        return Ok(VertexRecord::terminator());
    };

    for edge in &vertex.out_edges {
        let mapped = vertex.id_map.as_ref().and_then(|m| m.get(edge.in_vertex));
        match resolve(ctx, mapped)? {
            Some(head) => {
                ctx.get_or_create_edge(edge, source, head)?;
            }
            None => {
                warn!(source_id = edge.in_vertex, target = ?mapped, "no target vertex");
                ctx.increment(Counter::NullVertexEdgesIgnored);
            }
        }
    }
    Ok(VertexRecord::terminator())
}

fn resolve(ctx: &TaskContext<'_>, id: Option<TargetId>) -> Result<Option<TargetId>> {
    match id {
        Some(id) if ctx.vertex_exists(id)? => Ok(Some(id)),
        _ => Ok(None),
    }
}

/// Run one attempt over a partition. Terminators are returned only on commit.
pub fn run_task(mut ctx: TaskContext<'_>, vertices: &[VertexRecord]) -> Result<Vec<VertexRecord>> {
    let mut terminators = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        match map_vertex(vertex, &mut ctx) {
            Ok(t) => terminators.push(t),
            Err(e) => return Err(ctx.abort(e)),
        }
    }
    debug!(partition = ctx.partition(), vertices = vertices.len(), "edge-write done");
    ctx.commit()?;
    Ok(terminators)
}

//! Phase 1: write vertices, announce their target ids to neighbours.

use tracing::debug;

use crate::error::Result;
use crate::pipeline::task::TaskContext;
use crate::record::{ShellRecord, TaggedEnvelope, VertexRecord};

/// Shuffle output: (reduce key, envelope)
pub type Keyed = (u64, TaggedEnvelope);

/// Write one vertex and emit its envelopes into `out`.
///
/// For every incoming edge a shell keyed by the edge's tail tells that
/// vertex where this one landed. The vertex itself is reduced to its
/// target id plus outgoing adjacency and keyed by its own id.
pub fn map_vertex(mut vertex: VertexRecord, ctx: &mut TaskContext<'_>, out: &mut Vec<Keyed>) -> Result<()> {
    let target = ctx.get_or_create_vertex(&vertex)?;

    for edge in &vertex.in_edges {
        let shell = ShellRecord { source_id: vertex.id, target_id: target };
        out.push((edge.out_vertex, TaggedEnvelope::Shell(shell)));
    }

    vertex.strip_to_target(target);
    out.push((vertex.id, TaggedEnvelope::Vertex(vertex)));
    Ok(())
}

/// Run one attempt over a partition. Output is returned only on commit.
pub fn run_task(mut ctx: TaskContext<'_>, vertices: &[VertexRecord]) -> Result<Vec<Keyed>> {
    let mut out = Vec::with_capacity(vertices.len() * 2);
    for vertex in vertices {
        if let Err(e) = map_vertex(vertex.clone(), &mut ctx, &mut out) {
            return Err(ctx.abort(e));
        }
    }
    debug!(partition = ctx.partition(), vertices = vertices.len(), emitted = out.len(), "vertex-write done");
    ctx.commit()?;
    Ok(out)
}

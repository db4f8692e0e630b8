//! Shuffle payloads: the shell record and the two-case tagged envelope.

use serde::{Deserialize, Serialize};

use super::{TargetId, VertexRecord};

/// Minimal projection of a written vertex: who it is in the source graph
/// and what the target store called it. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellRecord {
    pub source_id: u64,
    pub target_id: TargetId,
}

/// Value type of the shuffle between the vertex-write and reconcile phases.
///
/// A reducer receives its own vertex as `Vertex` and identifier
/// announcements from incoming neighbours as `Shell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaggedEnvelope {
    Vertex(VertexRecord),
    Shell(ShellRecord),
}

impl TaggedEnvelope {
    /// Single-character tag: `'v'` for a vertex, `'s'` for a shell
    pub fn tag(&self) -> char {
        match self {
            TaggedEnvelope::Vertex(_) => 'v',
            TaggedEnvelope::Shell(_) => 's',
        }
    }

    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

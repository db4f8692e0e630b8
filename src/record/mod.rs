//! In-flight vertex and edge records carried between pipeline phases

pub mod envelope;
pub mod idmap;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use envelope::{ShellRecord, TaggedEnvelope};
pub use idmap::IdentifierMap;

/// Reserved vertex property holding the captured target-store identifier.
///
/// Source properties starting with `_` are rejected by the input reader,
/// so this key never collides with user data. The value is the id's bit
/// pattern as an `Int`, so ids at or above 2^63 read back negative here.
pub const TARGET_ID_KEY: &str = "_targetId";

/// Identifier of the terminator record emitted by the edge-write phase
pub const TERMINATOR_ID: u64 = u64::MAX;

/// Property map of a vertex or edge. Ordering is irrelevant.
pub type Properties = HashMap<String, PropertyValue>;

/// Identifier assigned by the target store. Opaque beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Property value domain shared by vertices and edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl PropertyValue {
    /// Convert a scalar JSON value. Arrays and objects have no counterpart.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(PropertyValue::Null),
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::String(s) => Some(PropertyValue::Str(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(PropertyValue::Int)
                .or_else(|| n.as_f64().map(PropertyValue::Float)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "{s}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        PropertyValue::Float(x)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Edge direction relative to the vertex holding the adjacency list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
}

/// Edge record. Endpoints are source identifiers used as lookup keys only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Edge label (e.g., "knows", "worksWith")
    pub label: String,

    pub properties: Properties,

    /// Source identifier of the tail vertex
    pub out_vertex: u64,

    /// Source identifier of the head vertex
    pub in_vertex: u64,
}

impl EdgeRecord {
    pub fn new(label: impl Into<String>, out_vertex: u64, in_vertex: u64) -> Self {
        Self {
            label: label.into(),
            properties: Properties::new(),
            out_vertex,
            in_vertex,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Source identifier of the endpoint in `direction`
    pub fn vertex(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Out => self.out_vertex,
            Direction::In => self.in_vertex,
        }
    }
}

/// Vertex record with both adjacency lists.
///
/// Phases strip what they no longer need: the vertex-write phase replaces
/// the property map with [`TARGET_ID_KEY`] and drops incoming edges; the
/// reconcile phase attaches an [`IdentifierMap`] for the outgoing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    /// Source identifier, unique within a run
    pub id: u64,

    pub properties: Properties,

    /// Incoming adjacency (this vertex is `in_vertex`)
    pub in_edges: Vec<EdgeRecord>,

    /// Outgoing adjacency (this vertex is `out_vertex`)
    pub out_edges: Vec<EdgeRecord>,

    /// Source id -> target id of outgoing neighbours, set by the reconcile phase
    pub id_map: Option<IdentifierMap>,
}

impl VertexRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            properties: Properties::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
            id_map: None,
        }
    }

    /// The degenerate record emitted once per vertex by the edge-write phase
    pub fn terminator() -> Self {
        Self::new(TERMINATOR_ID)
    }

    pub fn is_terminator(&self) -> bool {
        self.id == TERMINATOR_ID
            && self.properties.is_empty()
            && self.in_edges.is_empty()
            && self.out_edges.is_empty()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Add an outgoing edge to `in_vertex` and return it for property setup
    pub fn add_out_edge(&mut self, label: impl Into<String>, in_vertex: u64) -> &mut EdgeRecord {
        self.out_edges.push(EdgeRecord::new(label, self.id, in_vertex));
        let last = self.out_edges.len() - 1;
        &mut self.out_edges[last]
    }

    /// Add an incoming edge from `out_vertex` and return it for property setup
    pub fn add_in_edge(&mut self, label: impl Into<String>, out_vertex: u64) -> &mut EdgeRecord {
        self.in_edges.push(EdgeRecord::new(label, out_vertex, self.id));
        let last = self.in_edges.len() - 1;
        &mut self.in_edges[last]
    }

    pub fn edges(&self, direction: Direction) -> &[EdgeRecord] {
        match direction {
            Direction::Out => &self.out_edges,
            Direction::In => &self.in_edges,
        }
    }

    /// Target identifier captured by the vertex-write phase, if any
    pub fn target_id(&self) -> Option<TargetId> {
        self.properties
            .get(TARGET_ID_KEY)
            .and_then(PropertyValue::as_i64)
            .map(|raw| TargetId(u64::from_ne_bytes(raw.to_ne_bytes())))
    }

    /// Replace the property map with the reserved target identifier and
    /// drop incoming adjacency. Applied once the vertex is written.
    pub fn strip_to_target(&mut self, target: TargetId) {
        self.properties.clear();
        let raw = i64::from_ne_bytes(target.0.to_ne_bytes());
        self.properties
            .insert(TARGET_ID_KEY.to_string(), PropertyValue::Int(raw));
        self.in_edges.clear();
    }
}

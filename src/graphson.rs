//! Line-oriented JSON vertex input
//!
//! One vertex per line, adjacency inline:
//!
//! ```text
//! {"_id":1,"name":"marko","_outE":[{"_label":"knows","_inV":2,"weight":0.5}]}
//! {"_id":2,"name":"vadas","_inE":[{"_label":"knows","_outV":1,"weight":0.5}]}
//! ```
//!
//! Keys starting with `_` are reserved for structure; everything else is a
//! property. An edge listed under `_outE` takes its tail from the enclosing
//! vertex, one under `_inE` its head.

use std::collections::HashSet;
use std::io::BufRead;

use serde_json::{Map, Value};

use crate::error::{LoadError, Result};
use crate::record::{EdgeRecord, PropertyValue, Properties, VertexRecord, TERMINATOR_ID};

const ID: &str = "_id";
const OUT_EDGES: &str = "_outE";
const IN_EDGES: &str = "_inE";
const LABEL: &str = "_label";
const IN_VERTEX: &str = "_inV";
const OUT_VERTEX: &str = "_outV";

/// Streaming reader yielding one vertex per non-blank line.
pub struct GraphsonReader<R> {
    input: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> GraphsonReader<R> {
    pub fn new(input: R) -> Self {
        Self { input, line: 0, buf: String::new() }
    }
}

impl<R: BufRead> Iterator for GraphsonReader<R> {
    type Item = Result<VertexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.input.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            return Some(parse_line(text, self.line));
        }
    }
}

/// Read every vertex from `input`, stopping at the first bad line or the
/// first repeated `_id`.
pub fn read_vertices<R: BufRead>(input: R) -> Result<Vec<VertexRecord>> {
    let mut reader = GraphsonReader::new(input);
    let mut seen = HashSet::new();
    let mut vertices = Vec::new();
    while let Some(vertex) = reader.next() {
        let vertex = vertex?;
        if !seen.insert(vertex.id) {
            return Err(LoadError::Input {
                line: reader.line,
                message: format!("duplicate {ID} {}", vertex.id),
            });
        }
        vertices.push(vertex);
    }
    Ok(vertices)
}

/// Split `vertices` into `n` round-robin partitions (at least one).
pub fn partition(vertices: Vec<VertexRecord>, n: usize) -> Vec<Vec<VertexRecord>> {
    let n = n.max(1);
    let mut parts: Vec<Vec<VertexRecord>> = (0..n).map(|_| Vec::new()).collect();
    for (i, vertex) in vertices.into_iter().enumerate() {
        parts[i % n].push(vertex);
    }
    parts
}

/// Parse one line. `line` is 1-based and only used for error reporting.
pub fn parse_line(text: &str, line: usize) -> Result<VertexRecord> {
    let err = |message: String| LoadError::Input { line, message };

    let value: Value = serde_json::from_str(text).map_err(|e| err(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(err("expected a JSON object".into()));
    };

    let id = object
        .get(ID)
        .and_then(Value::as_u64)
        .ok_or_else(|| err(format!("missing or invalid {ID}")))?;
    if id == TERMINATOR_ID {
        return Err(err(format!("{ID} {id} is reserved for terminators")));
    }
    let mut vertex = VertexRecord::new(id);

    for (key, value) in &object {
        match key.as_str() {
            ID => {}
            OUT_EDGES => {
                for edge in edge_array(value).map_err(&err)? {
                    let in_vertex = endpoint(edge, IN_VERTEX).map_err(&err)?;
                    let mut record = EdgeRecord::new(label(edge).map_err(&err)?, id, in_vertex);
                    record.properties = properties(edge).map_err(&err)?;
                    vertex.out_edges.push(record);
                }
            }
            IN_EDGES => {
                for edge in edge_array(value).map_err(&err)? {
                    let out_vertex = endpoint(edge, OUT_VERTEX).map_err(&err)?;
                    let mut record = EdgeRecord::new(label(edge).map_err(&err)?, out_vertex, id);
                    record.properties = properties(edge).map_err(&err)?;
                    vertex.in_edges.push(record);
                }
            }
            reserved if reserved.starts_with('_') => {
                return Err(err(format!("reserved key {reserved}")));
            }
            _ => {
                let property = scalar(key, value).map_err(&err)?;
                vertex.properties.insert(key.clone(), property);
            }
        }
    }
    Ok(vertex)
}

/// Serialize a vertex back to one line of input.
pub fn to_line(vertex: &VertexRecord) -> String {
    let mut object = Map::new();
    object.insert(ID.into(), Value::from(vertex.id));
    for (key, value) in &vertex.properties {
        object.insert(key.clone(), json_value(value));
    }
    if !vertex.out_edges.is_empty() {
        let edges = vertex
            .out_edges
            .iter()
            .map(|e| edge_object(e, IN_VERTEX, e.in_vertex))
            .collect();
        object.insert(OUT_EDGES.into(), Value::Array(edges));
    }
    if !vertex.in_edges.is_empty() {
        let edges = vertex
            .in_edges
            .iter()
            .map(|e| edge_object(e, OUT_VERTEX, e.out_vertex))
            .collect();
        object.insert(IN_EDGES.into(), Value::Array(edges));
    }
    Value::Object(object).to_string()
}

fn edge_object(edge: &EdgeRecord, endpoint_key: &str, endpoint: u64) -> Value {
    let mut object = Map::new();
    object.insert(LABEL.into(), Value::from(edge.label.clone()));
    object.insert(endpoint_key.into(), Value::from(endpoint));
    for (key, value) in &edge.properties {
        object.insert(key.clone(), json_value(value));
    }
    Value::Object(object)
}

fn json_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Str(s) => Value::from(s.clone()),
        PropertyValue::Int(i) => Value::from(*i),
        PropertyValue::Float(x) => Value::from(*x),
        PropertyValue::Bool(b) => Value::from(*b),
        PropertyValue::Null => Value::Null,
    }
}

fn edge_array(value: &Value) -> std::result::Result<Vec<&Map<String, Value>>, String> {
    let Value::Array(items) = value else {
        return Err("edge list must be an array".into());
    };
    items
        .iter()
        .map(|item| item.as_object().ok_or_else(|| "edge must be an object".to_string()))
        .collect()
}

fn label(edge: &Map<String, Value>) -> std::result::Result<String, String> {
    edge.get(LABEL)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("edge missing {LABEL}"))
}

fn endpoint(edge: &Map<String, Value>, key: &str) -> std::result::Result<u64, String> {
    edge.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| format!("edge missing or invalid {key}"))
}

fn properties(edge: &Map<String, Value>) -> std::result::Result<Properties, String> {
    let mut props = Properties::new();
    for (key, value) in edge {
        if key.starts_with('_') {
            if key != LABEL && key != IN_VERTEX && key != OUT_VERTEX {
                return Err(format!("reserved key {key}"));
            }
            continue;
        }
        props.insert(key.clone(), scalar(key, value)?);
    }
    Ok(props)
}

fn scalar(key: &str, value: &Value) -> std::result::Result<PropertyValue, String> {
    PropertyValue::from_json(value).ok_or_else(|| format!("property {key} is not a scalar"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Direction;
    use std::io::Cursor;

    #[test]
    fn test_parse_vertex_with_adjacency() {
        let line = r#"{"_id":1,"name":"marko","age":29,"_outE":[{"_label":"knows","_inV":2,"weight":0.5}],"_inE":[{"_label":"created","_outV":4}]}"#;
        let v = parse_line(line, 1).unwrap();

        assert_eq!(v.id, 1);
        assert_eq!(v.property("name"), Some(&PropertyValue::from("marko")));
        assert_eq!(v.property("age"), Some(&PropertyValue::Int(29)));
        assert_eq!(v.out_edges.len(), 1);
        assert_eq!(v.out_edges[0].vertex(Direction::Out), 1);
        assert_eq!(v.out_edges[0].vertex(Direction::In), 2);
        assert_eq!(v.out_edges[0].property("weight"), Some(&PropertyValue::Float(0.5)));
        assert_eq!(v.in_edges[0].out_vertex, 4);
        assert_eq!(v.in_edges[0].in_vertex, 1);
        assert!(v.in_edges[0].properties.is_empty());
    }

    #[test]
    fn test_reader_skips_blank_lines_and_counts_lines() {
        let input = "{\"_id\":1}\n\n   \n{\"_id\":2}\n{\"_id\":-3}\n";
        let results: Vec<_> = GraphsonReader::new(Cursor::new(input)).collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap().id, 2);
        match &results[2] {
            Err(LoadError::Input { line, .. }) => assert_eq!(*line, 5),
            other => panic!("expected input error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_vertices_stops_at_first_error() {
        let input = "{\"_id\":1}\nnot json\n{\"_id\":3}\n";
        let err = read_vertices(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, LoadError::Input { line: 2, .. }));
    }

    #[test]
    fn test_read_vertices_rejects_duplicate_id() {
        let input = "{\"_id\":1}\n{\"_id\":2}\n\n{\"_id\":1,\"name\":\"again\"}\n";
        let err = read_vertices(Cursor::new(input)).unwrap_err();
        match err {
            LoadError::Input { line, message } => {
                assert_eq!(line, 4);
                assert!(message.contains("duplicate"));
            }
            other => panic!("expected input error, got {other:?}"),
        }
    }

    #[test]
    fn test_terminator_id_rejected() {
        let line = format!("{{\"_id\":{}}}", u64::MAX);
        let err = parse_line(&line, 1).unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(parse_line(&format!("{{\"_id\":{}}}", u64::MAX - 1), 1).is_ok());
    }

    #[test]
    fn test_reserved_property_key_rejected() {
        let err = parse_line(r#"{"_id":1,"_targetId":7}"#, 1).unwrap_err();
        assert!(err.to_string().contains("_targetId"));
    }

    #[test]
    fn test_nested_property_rejected() {
        assert!(parse_line(r#"{"_id":1,"tags":["a"]}"#, 1).is_err());
    }

    #[test]
    fn test_edge_without_label_rejected() {
        assert!(parse_line(r#"{"_id":1,"_outE":[{"_inV":2}]}"#, 1).is_err());
    }

    #[test]
    fn test_to_line_parses_back() {
        let mut v = VertexRecord::new(3).with_property("name", "vadas");
        v.add_in_edge("knows", 1).set_property("weight", 0.5);
        v.add_out_edge("likes", 9);

        let parsed = parse_line(&to_line(&v), 1).unwrap();
        assert_eq!(parsed, v);
    }

    #[test]
    fn test_partition_round_robin() {
        let vertices: Vec<_> = (0..7).map(VertexRecord::new).collect();
        let parts = partition(vertices, 3);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2, 2]);
        assert_eq!(parts[1][0].id, 1);
        assert_eq!(partition(Vec::new(), 0).len(), 1);
    }
}

//! Error types for the bulk loader

use thiserror::Error;

use crate::record::TargetId;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Vertex not found: {0}")]
    VertexNotFound(TargetId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(TargetId),

    #[error("Transaction already in progress")]
    TransactionInProgress,

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Policy '{policy}' failed: {message}")]
    Policy { policy: String, message: String },

    #[error("Policy '{policy}' does not provide {op}")]
    MissingOperation { policy: String, op: &'static str },

    #[error("Unknown write policy: {0}")]
    UnknownPolicy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{phase} task {partition} failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        phase: &'static str,
        partition: usize,
        attempts: u32,
        #[source]
        source: Box<LoadError>,
    },

    #[error("Shuffle error: {0}")]
    Shuffle(String),

    #[error("Input error at line {line}: {message}")]
    Input { line: usize, message: String },

    #[error("Source vertex {0} appears more than once")]
    DuplicateVertex(u64),

    #[error("Source vertex id {0} is reserved")]
    ReservedVertexId(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadError {
    /// Short stable code for logs and CLI exit reporting
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Store(_)
            | LoadError::VertexNotFound(_)
            | LoadError::EdgeNotFound(_)
            | LoadError::TransactionInProgress
            | LoadError::NoTransaction => "STORE_FAILURE",
            LoadError::Policy { .. } | LoadError::MissingOperation { .. } => "POLICY_FAILURE",
            LoadError::UnknownPolicy(_) | LoadError::InvalidConfig(_) => "INVALID_CONFIG",
            LoadError::TaskFailed { source, .. } => source.code(),
            LoadError::Input { .. }
            | LoadError::DuplicateVertex(_)
            | LoadError::ReservedVertexId(_) => "INVALID_INPUT",
            _ => "INTERNAL_ERROR",
        }
    }
}

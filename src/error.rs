//! Error handling for the QCB scheduler

use crate::dag::NodeId;
use thiserror::Error;

/// Result type for QCB operations
pub type Result<T> = core::result::Result<T, QcbError>;

/// Error types raised while building, scheduling or routing a graph.
///
/// Allocation and routing misses are not errors: they surface as
/// [`Allocation::CouldNotAllocate`](crate::topology::Allocation) or a `None`
/// route and the node is retried on the next cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcbError {
    /// A node referenced a resource that was never produced or declared
    #[error("Unknown resource '{symbol}' referenced by {instruction}")]
    UnknownResource { symbol: String, instruction: String },

    /// Structural problems in the dependency graph
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// A magic state is consumed but no factory produces it
    #[error("No factory registered for magic state '{0}'")]
    MissingFactory(String),

    /// The scheduler can make no further progress
    #[error("Scheduler stalled at cycle {cycle} with {} pending nodes", .pending.len())]
    Stalled { cycle: usize, pending: Vec<NodeId> },

    /// The router exhausted its retry budget
    #[error("Routing stalled at cycle {cycle} with {} waiting nodes", .waiting.len())]
    Unroutable { cycle: usize, waiting: Vec<NodeId> },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization failures
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl QcbError {
    /// Create an unknown resource error
    pub fn unknown_resource(symbol: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self::UnknownResource {
            symbol: symbol.into(),
            instruction: instruction.into(),
        }
    }

    /// Create an invalid graph error
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }

    /// Create a missing factory error
    pub fn missing_factory(symbol: impl Into<String>) -> Self {
        Self::MissingFactory(symbol.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<std::io::Error> for QcbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for QcbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

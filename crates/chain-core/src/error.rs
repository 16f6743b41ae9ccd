//! Error types for chain-core

use thiserror::Error;

/// Result type alias for chain-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for engine and tool operations
///
/// Failures of a running batch carry partial progress and are reported by
/// the executor's own error type instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The submitted step list is malformed and was rejected before dispatch
    #[error("Invalid workflow: {0}")]
    Structural(String),

    /// No tool is registered under the requested name
    #[error("Unknown function: {0}")]
    UnknownTool(String),

    /// Tool processing failed
    #[error("Tool processing failed: {0}")]
    ProcessingFailed(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error raised while resolving a directive or a field path against history
///
/// These never escape the resolver or the condition evaluator: both convert
/// them into a neutral value plus a logged warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// History index does not exist (yet)
    #[error("result index {index} out of range (history has {len} entries)")]
    HistoryIndex { index: usize, len: usize },

    /// `LAST` was referenced before any step executed
    #[error("no executed result available for LAST")]
    NoLastResult,

    /// Object key missing along a dot path
    #[error("field '{segment}' not found (available keys: {})", available.join(", "))]
    MissingField {
        segment: String,
        available: Vec<String>,
    },

    /// Array index missing along a dot path
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Attempted to descend into a scalar
    #[error("cannot read '{segment}' from a {kind} value")]
    NotTraversable { segment: String, kind: &'static str },

    /// An operator expected an array
    #[error("expected an array at '{what}', found {kind}")]
    NotAnArray { what: String, kind: &'static str },

    /// A numeric operand could not be parsed
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// Directive text matched a known prefix but not its grammar
    #[error("malformed directive '{0}'")]
    Malformed(String),

    /// Condition expression could not be evaluated
    #[error("cannot evaluate condition: {0}")]
    Condition(String),
}

use thiserror::Error;

use crate::backend::BackendError;
use crate::notation::NotationError;

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum SearchError {
    // ============ Translation ============
    #[error("Unsupported query node: {0}")]
    UnsupportedNode(&'static str),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Unknown comparison type: {0}")]
    UnknownComparison(String),
    #[error("{node} is not supported in this context: {reason}")]
    UnsupportedContext { node: &'static str, reason: String },
    #[error("Invalid comparison on field '{field}': {reason}")]
    InvalidComparison { field: String, reason: String },

    // ============ Materialization ============
    #[error("No scalar method found among {0:?}")]
    NoScalarMethod(Vec<String>),
    #[error("Sequence contains no elements")]
    NoElements,
    #[error("Sequence contains more than one element")]
    MoreThanOneElement,
    #[error("Index {index} is out of range for {len} results")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Could not map document: {0}")]
    Materialize(#[from] serde_json::Error),

    // ============ Collaborators ============
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Parse error: {0}")]
    Parse(#[from] NotationError),
    #[error("Configuration error: {0}")]
    Config(String),
}

//! Error types for the OT engine

use crate::operation::OperationKind;
use thiserror::Error;

/// Raised when an operation payload cannot be turned into an [`Operation`].
///
/// Out-of-range positions and lengths are never reported here; they are
/// clamped when the operation is applied.
///
/// [`Operation`]: crate::Operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperationError {
    #[error("Unknown operation type: {0}")]
    UnknownKind(String),

    #[error("{0} operation requires content")]
    MissingContent(OperationKind),

    #[error("{0} operation requires a length")]
    MissingLength(OperationKind),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperationError),

    #[error("Operation targets document {found}, queue belongs to {expected}")]
    DocumentMismatch { expected: String, found: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

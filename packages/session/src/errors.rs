//! Error types for collaborative sessions

use crate::store::StoreError;
use inkwell_ot::{EngineError, InvalidOperationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Document is not open: {0}")]
    NotOpen(String),

    #[error("Operation on {document_id} is based on version {base_version}, outside the known range {oldest}..={version}")]
    UnknownBase {
        document_id: String,
        base_version: u64,
        oldest: u64,
        version: u64,
    },

    #[error("Document actor has stopped: {0}")]
    ActorStopped(String),
}

impl From<InvalidOperationError> for SessionError {
    fn from(e: InvalidOperationError) -> Self {
        SessionError::Engine(e.into())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

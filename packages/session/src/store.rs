//! # Document Storage
//!
//! Where `(content, version)` pairs live between sessions. The engine never
//! touches storage; document actors load on open and save after every flush.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Persisted form of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    pub version: u64,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Stale write for {document_id}: stored version {stored} is ahead of {attempted}")]
    StaleWrite {
        document_id: String,
        stored: u64,
        attempted: u64,
    },
}

/// Persistence seam for document content and version
pub trait DocumentStore: Send + Sync + 'static {
    fn load(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError>;

    fn save(&self, document_id: &str, document: StoredDocument) -> Result<(), StoreError>;
}

/// In-memory store (for tests and single-process servers)
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a document at version 0
    pub fn with_document(self, document_id: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                document_id.into(),
                StoredDocument {
                    content: content.into(),
                    version: 0,
                },
            );
        self
    }

    pub fn get(&self, document_id: &str) -> Option<StoredDocument> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.get(document_id))
    }

    fn save(&self, document_id: &str, document: StoredDocument) -> Result<(), StoreError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(stored) = documents.get(document_id) {
            if stored.version > document.version {
                return Err(StoreError::StaleWrite {
                    document_id: document_id.to_string(),
                    stored: stored.version,
                    attempted: document.version,
                });
            }
        }

        documents.insert(document_id.to_string(), document);
        Ok(())
    }
}

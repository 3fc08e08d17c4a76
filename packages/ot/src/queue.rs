//! # Operation Queue
//!
//! Per-document buffer of pending operations.
//!
//! The queue never exposes arrival order: [`OperationQueue::sorted_operations`]
//! returns the application order defined by [`Operation::precedence`], so two
//! replicas holding the same set of operations fold them identically no matter
//! how the network delivered them.

use crate::errors::EngineError;
use crate::operation::{DocumentId, Operation};
use std::collections::HashMap;

/// Sort into application order
pub fn sort_operations(operations: &mut [Operation]) {
    operations.sort_by(|a, b| a.precedence(b));
}

/// Pending operations for a single document
#[derive(Debug, Clone)]
pub struct OperationQueue {
    document_id: DocumentId,
    pending: Vec<Operation>,
}

impl OperationQueue {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: document_id.into(),
            pending: Vec::new(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Add an operation; it must target this queue's document
    pub fn enqueue(&mut self, operation: Operation) -> Result<usize, EngineError> {
        if operation.document_id != self.document_id {
            return Err(EngineError::DocumentMismatch {
                expected: self.document_id.clone(),
                found: operation.document_id,
            });
        }
        self.pending.push(operation);
        Ok(self.pending.len())
    }

    /// Pending operations in application order
    pub fn sorted_operations(&self) -> Vec<Operation> {
        let mut operations = self.pending.clone();
        sort_operations(&mut operations);
        operations
    }

    /// Take every pending operation in application order, leaving the queue empty
    pub fn drain_sorted(&mut self) -> Vec<Operation> {
        let mut operations = std::mem::take(&mut self.pending);
        sort_operations(&mut operations);
        operations
    }

    /// Put drained operations back, e.g. after a fold could not be committed.
    /// Operations for other documents are dropped.
    pub fn requeue(&mut self, operations: impl IntoIterator<Item = Operation>) {
        let document_id = &self.document_id;
        self.pending.extend(
            operations
                .into_iter()
                .filter(|op| &op.document_id == document_id),
        );
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Queues for many documents, keyed by document id
#[derive(Debug, Default)]
pub struct OperationQueues {
    queues: HashMap<DocumentId, OperationQueue>,
}

impl OperationQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, document_id: &str, operation: Operation) -> Result<usize, EngineError> {
        self.queues
            .entry(document_id.to_string())
            .or_insert_with(|| OperationQueue::new(document_id))
            .enqueue(operation)
    }

    pub fn sorted_operations(&self, document_id: &str) -> Vec<Operation> {
        self.queues
            .get(document_id)
            .map(OperationQueue::sorted_operations)
            .unwrap_or_default()
    }

    pub fn drain_sorted(&mut self, document_id: &str) -> Vec<Operation> {
        self.queues
            .remove(document_id)
            .map(|mut queue| queue.drain_sorted())
            .unwrap_or_default()
    }

    pub fn get(&self, document_id: &str) -> Option<&OperationQueue> {
        self.queues.get(document_id)
    }

    /// Ids of documents with pending operations, sorted
    pub fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self
            .queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

//! # Document State
//!
//! The `(content, version)` pair of one collaboratively edited document, plus
//! the snapshot used for consistency checks.
//!
//! A `DocumentState` is owned by whoever serializes edits to that document and
//! is passed to the engine by reference; the engine keeps nothing between
//! calls.

use crate::consistency::{ConsistencyReport, ExpectedState};
use crate::operation::{DocumentId, Operation};
use crate::sequence::{apply_ordered, apply_sequence, AppliedOperation, SequenceOutcome};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DocumentState {
    pub document_id: DocumentId,
    pub content: String,
    /// Increments once per applied operation
    pub version: u64,
    expected: Option<ExpectedState>,
}

/// A batch folded into a [`DocumentState`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBatch {
    pub base_version: u64,
    pub version: u64,
    pub content: String,
    pub operations: Vec<AppliedOperation>,
}

impl AppliedBatch {
    /// Applied operations paired with the version each one produced
    pub fn versioned(&self) -> impl Iterator<Item = (u64, &AppliedOperation)> {
        let base = self.base_version;
        self.operations
            .iter()
            .enumerate()
            .map(move |(i, op)| (base + i as u64 + 1, op))
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl DocumentState {
    pub fn new(document_id: impl Into<DocumentId>, content: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            content: content.into(),
            version: 0,
            expected: None,
        }
    }

    /// Builder: resume from a stored version
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Fold a batch of concurrent operations in application order
    pub fn apply_batch(&mut self, operations: &[Operation]) -> AppliedBatch {
        let outcome = apply_sequence(&self.content, operations);
        self.commit(outcome)
    }

    /// Fold a batch in the order given
    pub fn apply_batch_ordered(&mut self, operations: &[Operation]) -> AppliedBatch {
        let outcome = apply_ordered(&self.content, operations);
        self.commit(outcome)
    }

    /// Apply a single operation against the current content
    pub fn apply_operation(&mut self, operation: &Operation) -> AppliedBatch {
        self.apply_batch(std::slice::from_ref(operation))
    }

    /// Apply `steps`, the sequential in-range form of `operation` after
    /// rebasing, as a single new version
    pub fn apply_steps(&mut self, operation: &Operation, steps: Vec<Operation>) -> AppliedBatch {
        let content = steps
            .iter()
            .fold(self.content.clone(), |content, step| step.apply(&content));
        self.commit(SequenceOutcome {
            content: content.clone(),
            applied: vec![AppliedOperation {
                operation: operation.clone(),
                transformed: steps,
                content,
            }],
        })
    }

    fn commit(&mut self, outcome: SequenceOutcome) -> AppliedBatch {
        let base_version = self.version;
        self.version += outcome.applied.len() as u64;
        self.content = outcome.content;

        debug!(
            document_id = %self.document_id,
            base_version,
            version = self.version,
            "Applied batch"
        );

        AppliedBatch {
            base_version,
            version: self.version,
            content: self.content.clone(),
            operations: outcome.applied,
        }
    }

    /// Record what a client should now hold
    pub fn record_expected(&mut self, content: impl Into<String>, version: u64) {
        self.expected = Some(ExpectedState::new(content, version));
    }

    /// Record the current content as the expectation
    pub fn record_current(&mut self) {
        self.expected = Some(ExpectedState::new(self.content.clone(), self.version));
    }

    pub fn expected_state(&self) -> Option<&ExpectedState> {
        self.expected.as_ref()
    }

    pub fn clear_expected(&mut self) {
        self.expected = None;
    }

    pub fn verify_consistency(&self, actual: &str) -> bool {
        crate::consistency::verify_consistency(self.expected.as_ref(), actual)
    }

    pub fn consistency_report(&self, actual: &str) -> ConsistencyReport {
        self.expected
            .as_ref()
            .map(|expected| expected.report(actual))
            .unwrap_or(ConsistencyReport::Unrecorded)
    }
}

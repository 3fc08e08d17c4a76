//! # Sequence Applier
//!
//! Folds a batch of concurrent operations onto a base content.
//!
//! Every operation in a batch is expressed against the same base. They are
//! normalized against that base, sorted into application order, and each one
//! is rebased over everything already folded in before it is applied:
//!
//! ```text
//! base ─ op₁ ─ rebase(op₂, [op₁]) ─ rebase(op₃, [op₁, op₂']) ─ ...
//! ```

use crate::operation::{char_len, Operation};
use crate::queue::sort_operations;
use crate::transform::rebase;
use tracing::{debug, instrument};

/// One operation of a batch after folding
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOperation {
    /// The operation as submitted, clamped against the base
    pub operation: Operation,

    /// What was actually applied (usually one operation)
    pub transformed: Vec<Operation>,

    /// Content right after this operation
    pub content: String,
}

/// Result of folding a batch
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceOutcome {
    pub content: String,
    pub applied: Vec<AppliedOperation>,
}

impl SequenceOutcome {
    /// Every applied operation, flattened, in the order it was applied
    pub fn transformed_operations(&self) -> impl Iterator<Item = &Operation> {
        self.applied.iter().flat_map(|applied| applied.transformed.iter())
    }
}

/// Fold `operations` onto `base` in application order
pub fn apply_sequence(base: &str, operations: &[Operation]) -> SequenceOutcome {
    let mut ordered = operations.to_vec();
    sort_operations(&mut ordered);
    apply_ordered(base, &ordered)
}

/// Fold `operations` onto `base` in the order given.
///
/// Callers that choose their own order (e.g. by author priority) use this;
/// everyone else wants [`apply_sequence`].
#[instrument(skip_all, fields(operations = operations.len()))]
pub fn apply_ordered(base: &str, operations: &[Operation]) -> SequenceOutcome {
    let base_len = char_len(base);
    let mut content = base.to_string();
    let mut history: Vec<Operation> = Vec::new();
    let mut applied = Vec::with_capacity(operations.len());

    for operation in operations {
        let operation = operation.normalize(base_len);
        let transformed = rebase(&operation, &history);
        for step in &transformed {
            content = step.apply(&content);
        }

        debug!(
            author_id = %operation.author_id,
            kind = %operation.kind(),
            position = operation.position(),
            steps = transformed.len(),
            "Folded operation"
        );

        history.extend(transformed.iter().cloned());
        applied.push(AppliedOperation {
            operation,
            transformed,
            content: content.clone(),
        });
    }

    SequenceOutcome { content, applied }
}

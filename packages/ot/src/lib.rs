//! # Inkwell OT
//!
//! Operational-transform engine for collaborative plain-text editing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ transport: receives wire payloads           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ ot: validate → queue → sort → fold          │
//! │  - Operation: validated edit + ordering     │
//! │  - transform / rebase: pairwise rules       │
//! │  - OperationQueue: application order        │
//! │  - apply_sequence: fold-with-transform      │
//! │  - ConflictResolver: winner + counterpart   │
//! │  - ExpectedState: divergence detection      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ session: persist (content, version),        │
//! │ broadcast transformed operations            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Pure and synchronous**: nothing here blocks, spawns or does I/O
//! 2. **Clamp, don't reject**: out-of-range positions are bounded, malformed
//!    payloads are errors
//! 3. **Arrival order is irrelevant**: batches fold in application order
//! 4. **Never discard an edit**: conflicts reposition, they don't drop
//!
//! ## Usage
//!
//! ```rust
//! use inkwell_ot::{apply_sequence, transform, Operation};
//!
//! let a = Operation::insert(5, "A").by("alice").at(100.0);
//! let b = Operation::insert(5, "B").by("bob").at(100.1);
//!
//! // b rewritten to apply after a
//! assert_eq!(transform(&a, &b)[0].position(), 6);
//!
//! // Both folded onto a base in application order
//! let outcome = apply_sequence("Hello world", &[b, a]);
//! assert_eq!(outcome.content, "HelloAB world");
//! ```

mod clock;
mod consistency;
mod errors;
mod operation;
mod queue;
mod resolver;
mod sequence;
mod state;
mod transform;

pub use clock::LamportClock;
pub use consistency::{verify_consistency, ConsistencyReport, ExpectedState};
pub use errors::{EngineError, InvalidOperationError};
pub use operation::{
    apply, clamp_position, validate, AuthorId, DocumentId, Edit, Operation, OperationKind,
    OperationPayload, Timestamp,
};
pub use queue::{sort_operations, OperationQueue, OperationQueues};
pub use resolver::{
    detect_conflicts, AuthorPriority, Conflict, ConflictKind, ConflictResolution,
    ConflictResolver, NoPriority, ResolutionStrategy,
};
pub use sequence::{apply_ordered, apply_sequence, AppliedOperation, SequenceOutcome};
pub use state::{AppliedBatch, DocumentState};
pub use transform::{
    decompose, rebase, rebase_on, transform, transform_cursor, transform_cursor_through,
    transform_on, transform_sequences,
};

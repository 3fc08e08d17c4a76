//! # Conflict Resolution
//!
//! Picks a winner between two concurrent operations and rewrites the loser so
//! it applies after the winner. Nothing is ever discarded: the loser is only
//! repositioned.
//!
//! ## Strategies
//!
//! - `timestamp_priority` (default): the operation that
//!   [precedes](crate::Operation::precedes) the other wins
//! - `user_priority`: the author with the higher caller-supplied priority
//!   wins; equal priorities fall back to precedence

use crate::operation::{char_len, Operation};
use crate::queue::sort_operations;
use crate::transform::rebase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    #[default]
    TimestampPriority,
    UserPriority,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::TimestampPriority => "timestamp_priority",
            ResolutionStrategy::UserPriority => "user_priority",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied author ranking for `user_priority` resolution.
///
/// Higher values win. Unknown authors should rank 0.
pub trait AuthorPriority {
    fn priority(&self, author_id: &str) -> i64;
}

impl AuthorPriority for HashMap<String, i64> {
    fn priority(&self, author_id: &str) -> i64 {
        self.get(author_id).copied().unwrap_or(0)
    }
}

impl<F> AuthorPriority for F
where
    F: Fn(&str) -> i64,
{
    fn priority(&self, author_id: &str) -> i64 {
        self(author_id)
    }
}

/// Ranks every author equally
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriority;

impl AuthorPriority for NoPriority {
    fn priority(&self, _author_id: &str) -> i64 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two zero-width edits at the same point
    SamePosition,
    /// An insertion point strictly inside the other edit's range
    InsertInsideRange,
    /// Two ranges share at least one char
    OverlappingRange,
}

/// A detected overlap between two operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// Where the overlap starts
    pub position: usize,
    pub authors: (String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolution {
    pub strategy: ResolutionStrategy,
    pub winning_operation: Operation,
    /// The losing operation, rewritten to apply after the winner
    pub transformed_operations: Vec<Operation>,
    pub conflicts: Vec<Conflict>,
}

/// Resolves pairs of concurrent operations
#[derive(Debug, Clone)]
pub struct ConflictResolver<P = NoPriority> {
    default_strategy: ResolutionStrategy,
    priorities: P,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self {
            default_strategy: ResolutionStrategy::default(),
            priorities: NoPriority,
        }
    }
}

impl<P: AuthorPriority> ConflictResolver<P> {
    /// Builder: set the author ranking used by `user_priority`
    pub fn with_priorities<Q: AuthorPriority>(self, priorities: Q) -> ConflictResolver<Q> {
        ConflictResolver {
            default_strategy: self.default_strategy,
            priorities,
        }
    }

    /// Builder: set the strategy used by [`resolve`](Self::resolve)
    pub fn with_default_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default_strategy
    }

    pub fn priorities(&self) -> &P {
        &self.priorities
    }

    /// Resolve with the default strategy.
    ///
    /// Both operations must be in range for the content they were written
    /// against; use [`resolve_on`](Self::resolve_on) for raw input.
    pub fn resolve(&self, a: &Operation, b: &Operation) -> ConflictResolution {
        self.resolve_with(a, b, self.default_strategy)
    }

    /// Resolve with the default strategy, clamping both operations to `base`
    pub fn resolve_on(&self, base: &str, a: &Operation, b: &Operation) -> ConflictResolution {
        self.resolve_with_on(base, a, b, self.default_strategy)
    }

    pub fn resolve_with_on(
        &self,
        base: &str,
        a: &Operation,
        b: &Operation,
        strategy: ResolutionStrategy,
    ) -> ConflictResolution {
        let len = char_len(base);
        self.resolve_with(&a.normalize(len), &b.normalize(len), strategy)
    }

    pub fn resolve_with(
        &self,
        a: &Operation,
        b: &Operation,
        strategy: ResolutionStrategy,
    ) -> ConflictResolution {
        let a_wins = match strategy {
            ResolutionStrategy::TimestampPriority => !b.precedes(a),
            ResolutionStrategy::UserPriority => {
                let (pa, pb) = (
                    self.priorities.priority(&a.author_id),
                    self.priorities.priority(&b.author_id),
                );
                pa > pb || (pa == pb && !b.precedes(a))
            }
        };
        let (winner, loser) = if a_wins { (a, b) } else { (b, a) };

        let conflicts = detect_conflicts(a, b);
        debug!(
            strategy = %strategy,
            winner = %winner.author_id,
            loser = %loser.author_id,
            conflicts = conflicts.len(),
            "Resolved concurrent operations"
        );

        ConflictResolution {
            strategy,
            winning_operation: winner.clone(),
            transformed_operations: rebase(loser, std::slice::from_ref(winner)),
            conflicts,
        }
    }

    /// Order a batch for folding: higher priority first, then precedence
    pub fn order(&self, operations: &mut [Operation], strategy: ResolutionStrategy) {
        match strategy {
            ResolutionStrategy::TimestampPriority => sort_operations(operations),
            ResolutionStrategy::UserPriority => operations.sort_by(|a, b| {
                self.priorities
                    .priority(&b.author_id)
                    .cmp(&self.priorities.priority(&a.author_id))
                    .then_with(|| a.precedence(b))
            }),
        }
    }
}

/// Half-open char range touched by an operation (empty for inserts)
fn span(op: &Operation) -> (usize, usize) {
    let start = op.position().max(0) as usize;
    (start, start + op.length())
}

/// Report how two concurrent operations overlap, if at all
pub fn detect_conflicts(a: &Operation, b: &Operation) -> Vec<Conflict> {
    let (a0, a1) = span(a);
    let (b0, b1) = span(b);
    let authors = (a.author_id.clone(), b.author_id.clone());

    let found = match (a0 == a1, b0 == b1) {
        (true, true) if a0 == b0 => Some((ConflictKind::SamePosition, a0)),
        (true, false) if b0 < a0 && a0 < b1 => Some((ConflictKind::InsertInsideRange, a0)),
        (false, true) if a0 < b0 && b0 < a1 => Some((ConflictKind::InsertInsideRange, b0)),
        (false, false) if a0 < b1 && b0 < a1 => Some((ConflictKind::OverlappingRange, a0.max(b0))),
        _ => None,
    };

    found
        .map(|(kind, position)| Conflict {
            kind,
            position,
            authors,
        })
        .into_iter()
        .collect()
}

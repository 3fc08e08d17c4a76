//! # Consistency Verifier
//!
//! Compares content a client reports against a snapshot recorded for it.
//! Advisory only: a mismatch is reported, never repaired here.

use serde::{Deserialize, Serialize};

/// Snapshot of what a document is expected to contain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedState {
    pub content: String,
    pub version: u64,
}

impl ExpectedState {
    pub fn new(content: impl Into<String>, version: u64) -> Self {
        Self {
            content: content.into(),
            version,
        }
    }

    pub fn verify(&self, actual: &str) -> bool {
        self.content == actual
    }

    pub fn report(&self, actual: &str) -> ConsistencyReport {
        match first_difference(&self.content, actual) {
            None => ConsistencyReport::Consistent {
                version: self.version,
            },
            Some(offset) => ConsistencyReport::Diverged {
                expected_version: self.version,
                first_difference: offset,
            },
        }
    }
}

/// Outcome of a consistency check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsistencyReport {
    Consistent { version: u64 },
    /// `first_difference` is the char index where the contents part ways
    Diverged {
        expected_version: u64,
        first_difference: usize,
    },
    /// Nothing recorded to compare against
    Unrecorded,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ConsistencyReport::Consistent { .. })
    }
}

/// Check `actual` against an optional snapshot.
///
/// With no snapshot recorded the answer is `false`.
pub fn verify_consistency(expected: Option<&ExpectedState>, actual: &str) -> bool {
    expected.is_some_and(|state| state.verify(actual))
}

fn first_difference(expected: &str, actual: &str) -> Option<usize> {
    let mut expected_chars = expected.chars();
    let mut actual_chars = actual.chars();
    let mut index = 0;
    loop {
        match (expected_chars.next(), actual_chars.next()) {
            (None, None) => return None,
            (Some(a), Some(b)) if a == b => index += 1,
            _ => return Some(index),
        }
    }
}

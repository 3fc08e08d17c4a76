//! # Operations
//!
//! The atomic edit record exchanged between collaborators.
//!
//! An [`Operation`] is an [`Edit`] plus the metadata needed to order it
//! against concurrent edits: the author, the target document, a wall-clock
//! [`Timestamp`] and an optional Lamport clock.
//!
//! ## Positions
//!
//! Positions and lengths count chars, not bytes. Positions are kept exactly
//! as the caller sent them (possibly negative or past the end) and are
//! clamped against the content when the operation is applied:
//!
//! - `position < 0` behaves as the start of the content
//! - `position > len` behaves as the end of the content
//! - a delete range running past the end stops at the end
//!
//! ## Wire format
//!
//! ```text
//! { "type": "insert" | "delete" | "replace",
//!   "position": int, "length": int?, "content": string?,
//!   "user_id": id, "document_id": id, "timestamp": float, "clock": int?,
//!   "base_version": int? }
//! ```
//!
//! Deserializing an [`Operation`] validates the payload, so malformed input is
//! rejected at the boundary with [`InvalidOperationError`].

use crate::errors::{EngineError, InvalidOperationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub type AuthorId = String;
pub type DocumentId = String;

/// Payload-free discriminant of an [`Edit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Delete,
    Replace,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
            OperationKind::Replace => "replace",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = InvalidOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(OperationKind::Insert),
            "delete" => Ok(OperationKind::Delete),
            "replace" => Ok(OperationKind::Replace),
            other => Err(InvalidOperationError::UnknownKind(other.to_string())),
        }
    }
}

/// What an operation does to the text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Edit {
    /// Splice `content` in at `position`
    Insert { position: i64, content: String },

    /// Remove `length` chars starting at `position`
    Delete { position: i64, length: usize },

    /// Remove `length` chars at `position`, then insert `content` there
    Replace {
        position: i64,
        length: usize,
        content: String,
    },
}

impl Edit {
    pub fn kind(&self) -> OperationKind {
        match self {
            Edit::Insert { .. } => OperationKind::Insert,
            Edit::Delete { .. } => OperationKind::Delete,
            Edit::Replace { .. } => OperationKind::Replace,
        }
    }

    pub fn position(&self) -> i64 {
        match self {
            Edit::Insert { position, .. }
            | Edit::Delete { position, .. }
            | Edit::Replace { position, .. } => *position,
        }
    }

    /// Number of chars removed (always 0 for inserts)
    pub fn length(&self) -> usize {
        match self {
            Edit::Insert { .. } => 0,
            Edit::Delete { length, .. } | Edit::Replace { length, .. } => *length,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Edit::Insert { content, .. } | Edit::Replace { content, .. } => Some(content),
            Edit::Delete { .. } => None,
        }
    }

    /// Same edit, moved to `position`
    pub fn moved_to(&self, position: usize) -> Edit {
        let position = position as i64;
        match self {
            Edit::Insert { content, .. } => Edit::Insert {
                position,
                content: content.clone(),
            },
            Edit::Delete { length, .. } => Edit::Delete {
                position,
                length: *length,
            },
            Edit::Replace {
                length, content, ..
            } => Edit::Replace {
                position,
                length: *length,
                content: content.clone(),
            },
        }
    }
}

/// Client wall-clock time in seconds, totally ordered.
///
/// Ordering uses [`f64::total_cmp`], so even NaN has a fixed place and sorting
/// never depends on input order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros();
        Timestamp(micros as f64 / 1_000_000.0)
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Timestamp {
    fn from(value: f64) -> Self {
        Timestamp(value)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A validated edit plus its ordering metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OperationPayload", into = "OperationPayload")]
pub struct Operation {
    pub edit: Edit,
    pub author_id: AuthorId,
    pub document_id: DocumentId,
    pub timestamp: Timestamp,
    /// Lamport clock supplied by the client (0 when the client has none)
    pub clock: u64,
    /// Document version the client wrote this against, when it knows it
    pub base_version: Option<u64>,
}

impl Operation {
    pub fn new(edit: Edit) -> Self {
        Self {
            edit,
            author_id: String::new(),
            document_id: String::new(),
            timestamp: Timestamp::now(),
            clock: 0,
            base_version: None,
        }
    }

    pub fn insert(position: i64, content: impl Into<String>) -> Self {
        Self::new(Edit::Insert {
            position,
            content: content.into(),
        })
    }

    pub fn delete(position: i64, length: usize) -> Self {
        Self::new(Edit::Delete { position, length })
    }

    pub fn replace(position: i64, length: usize, content: impl Into<String>) -> Self {
        Self::new(Edit::Replace {
            position,
            length,
            content: content.into(),
        })
    }

    /// Builder: set the author
    pub fn by(mut self, author_id: impl Into<AuthorId>) -> Self {
        self.author_id = author_id.into();
        self
    }

    /// Builder: set the target document
    pub fn on(mut self, document_id: impl Into<DocumentId>) -> Self {
        self.document_id = document_id.into();
        self
    }

    /// Builder: set the wall-clock timestamp
    pub fn at(mut self, timestamp: impl Into<Timestamp>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Builder: set the Lamport clock
    pub fn with_clock(mut self, clock: u64) -> Self {
        self.clock = clock;
        self
    }

    /// Builder: set the version this operation was written against
    pub fn based_on(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    /// Parse and validate a wire payload
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let payload: OperationPayload = serde_json::from_str(json)?;
        Ok(Operation::try_from(payload)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> OperationKind {
        self.edit.kind()
    }

    pub fn position(&self) -> i64 {
        self.edit.position()
    }

    pub fn length(&self) -> usize {
        self.edit.length()
    }

    pub fn content(&self) -> Option<&str> {
        self.edit.content()
    }

    /// Same metadata, different edit
    pub fn with_edit(&self, edit: Edit) -> Self {
        Self {
            edit,
            author_id: self.author_id.clone(),
            document_id: self.document_id.clone(),
            timestamp: self.timestamp,
            clock: self.clock,
            base_version: self.base_version,
        }
    }

    /// Clamp position and length against a content of `len` chars.
    ///
    /// The result applies to that content exactly as `self` would.
    pub fn normalize(&self, len: usize) -> Self {
        let start = clamp_position(self.position(), len);
        let edit = match &self.edit {
            Edit::Insert { content, .. } => Edit::Insert {
                position: start as i64,
                content: content.clone(),
            },
            Edit::Delete { length, .. } => Edit::Delete {
                position: start as i64,
                length: (*length).min(len - start),
            },
            Edit::Replace {
                length, content, ..
            } => Edit::Replace {
                position: start as i64,
                length: (*length).min(len - start),
                content: content.clone(),
            },
        };
        self.with_edit(edit)
    }

    /// Apply to `content`, clamping out-of-range positions
    pub fn apply(&self, content: &str) -> String {
        let len = char_len(content);
        let start = clamp_position(self.position(), len);
        match &self.edit {
            Edit::Insert { content: text, .. } => {
                if text.is_empty() {
                    return content.to_string();
                }
                splice(content, start, start, text)
            }
            Edit::Delete { length, .. } => {
                splice(content, start, start.saturating_add(*length).min(len), "")
            }
            Edit::Replace {
                length,
                content: text,
                ..
            } => splice(content, start, start.saturating_add(*length).min(len), text),
        }
    }

    /// Application-order comparison.
    ///
    /// Orders by `(clock, timestamp, author_id)`, then by the edit itself, so
    /// distinct operations never compare equal.
    pub fn precedence(&self, other: &Operation) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then(self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.author_id.cmp(&other.author_id))
            .then_with(|| compare_edits(&self.edit, &other.edit))
    }

    /// True when `self` is ordered strictly before `other`
    pub fn precedes(&self, other: &Operation) -> bool {
        self.precedence(other) == Ordering::Less
    }
}

fn compare_edits(a: &Edit, b: &Edit) -> Ordering {
    a.kind()
        .cmp(&b.kind())
        .then(a.position().cmp(&b.position()))
        .then(a.length().cmp(&b.length()))
        .then_with(|| a.content().cmp(&b.content()))
}

/// Apply `op` to `content`
pub fn apply(content: &str, op: &Operation) -> String {
    op.apply(content)
}

/// Validate a raw payload without building the operation
pub fn validate(payload: &OperationPayload) -> Result<OperationKind, InvalidOperationError> {
    let kind: OperationKind = payload.kind.parse()?;
    if matches!(kind, OperationKind::Insert | OperationKind::Replace) && payload.content.is_none() {
        return Err(InvalidOperationError::MissingContent(kind));
    }
    if matches!(kind, OperationKind::Delete | OperationKind::Replace) && payload.length.is_none() {
        return Err(InvalidOperationError::MissingLength(kind));
    }
    Ok(kind)
}

/// Number of chars in `s`
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Bound `position` to `0..=len`
pub fn clamp_position(position: i64, len: usize) -> usize {
    if position <= 0 {
        0
    } else {
        (position as u64).min(len as u64) as usize
    }
}

fn byte_offset(content: &str, chars: usize) -> usize {
    content
        .char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(content.len())
}

/// Replace the chars in `start..end` with `text`
fn splice(content: &str, start: usize, end: usize, text: &str) -> String {
    let from = byte_offset(content, start);
    let to = byte_offset(content, end);
    let mut out = String::with_capacity(content.len() - (to - from) + text.len());
    out.push_str(&content[..from]);
    out.push_str(text);
    out.push_str(&content[to..]);
    out
}

/// Operation as it travels over the wire (unvalidated)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub position: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub document_id: String,

    #[serde(default)]
    pub timestamp: f64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub clock: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl TryFrom<OperationPayload> for Operation {
    type Error = InvalidOperationError;

    fn try_from(payload: OperationPayload) -> Result<Self, Self::Error> {
        let kind = validate(&payload)?;
        // Negative lengths clamp to an empty range
        let length = payload.length.unwrap_or(0).max(0) as usize;
        let position = payload.position;
        let edit = match kind {
            OperationKind::Insert => Edit::Insert {
                position,
                content: payload.content.unwrap_or_default(),
            },
            OperationKind::Delete => Edit::Delete { position, length },
            OperationKind::Replace => Edit::Replace {
                position,
                length,
                content: payload.content.unwrap_or_default(),
            },
        };

        Ok(Operation {
            edit,
            author_id: payload.user_id,
            document_id: payload.document_id,
            timestamp: Timestamp(payload.timestamp),
            clock: payload.clock,
            base_version: payload.base_version,
        })
    }
}

impl From<Operation> for OperationPayload {
    fn from(op: Operation) -> Self {
        let kind = op.kind().as_str().to_string();
        let (position, length, content) = match op.edit {
            Edit::Insert { position, content } => (position, None, Some(content)),
            Edit::Delete { position, length } => (position, Some(length as i64), None),
            Edit::Replace {
                position,
                length,
                content,
            } => (position, Some(length as i64), Some(content)),
        };

        OperationPayload {
            kind,
            position,
            length,
            content,
            user_id: op.author_id,
            document_id: op.document_id,
            timestamp: op.timestamp.0,
            clock: op.clock,
            base_version: op.base_version,
        }
    }
}

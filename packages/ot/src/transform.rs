//! # Transform Engine
//!
//! Rewrites an operation so it keeps its intent after a concurrent operation
//! has already been applied.
//!
//! ## Rules (applied → pending)
//!
//! | applied | pending | rule |
//! |---------|---------|------|
//! | Insert  | Insert  | shift right if the insert landed before; equal positions go to the operation that [precedes](crate::Operation::precedes) |
//! | Insert  | Delete  | shift right if the insert landed at or before; split around an insert landing inside the range |
//! | Delete  | Insert  | shift left if after the range; collapse to the range start if inside |
//! | Delete  | Delete  | subtract the removed interval |
//! | Replace | any     | decomposed into Delete then Insert |
//!
//! The split case is why transforms return a list: an insert landing inside a
//! concurrent delete must survive on both sides, so the delete becomes two
//! deletes around the inserted text. Almost every transform yields exactly
//! one operation.
//!
//! All multi-operation folding goes through [`rebase`].

use crate::operation::{char_len, Edit, Operation, OperationKind};

/// Transform `pending` so it applies after `applied`.
///
/// Both operations must be expressed against the same content and already
/// [normalized](Operation::normalize) to it. Use [`transform_on`] for raw input.
pub fn transform(applied: &Operation, pending: &Operation) -> Vec<Operation> {
    rebase(pending, std::slice::from_ref(applied))
}

/// [`transform`] for operations that may be out of range on a content of `len` chars
pub fn transform_on(len: usize, applied: &Operation, pending: &Operation) -> Vec<Operation> {
    rebase_on(len, pending, std::slice::from_ref(applied))
}

/// Transform `pending` so it applies after every operation in `history`.
///
/// `pending` is expressed against the content `history` started from; the
/// history operations are sequential (each applies after the previous one).
/// Every operation must be in range for the content it applies to; see
/// [`rebase_on`].
pub fn rebase(pending: &Operation, history: &[Operation]) -> Vec<Operation> {
    let steps: Vec<Operation> = history.iter().flat_map(decompose).collect();
    let (_, rebased) = transform_sequences(&steps, &decompose(pending));
    recompose(pending, rebased)
}

/// [`rebase`] starting from a content of `len` chars, clamping every operation
/// to the content it applies to first.
pub fn rebase_on(len: usize, pending: &Operation, history: &[Operation]) -> Vec<Operation> {
    let mut current = len;
    let history: Vec<Operation> = history
        .iter()
        .map(|op| {
            let op = op.normalize(current);
            current = len_after(current, &op);
            op
        })
        .collect();
    rebase(&pending.normalize(len), &history)
}

/// Length of a `len`-char content after a normalized `op`
pub(crate) fn len_after(len: usize, op: &Operation) -> usize {
    len - op.length() + op.content().map(char_len).unwrap_or(0)
}

/// Transform two concurrent sequences against each other.
///
/// Returns `(applied', pending')` where `applied'` applies after `pending`
/// and `pending'` applies after `applied`.
pub fn transform_sequences(
    applied: &[Operation],
    pending: &[Operation],
) -> (Vec<Operation>, Vec<Operation>) {
    match (applied, pending) {
        ([], _) | (_, []) => (applied.to_vec(), pending.to_vec()),
        ([a], [p]) => (include(p, a), include(a, p)),
        ([a], _) => {
            let mut current = vec![a.clone()];
            let mut rebased = Vec::with_capacity(pending.len());
            for p in pending {
                let (next, after) = transform_sequences(&current, std::slice::from_ref(p));
                rebased.extend(after);
                current = next;
            }
            (current, rebased)
        }
        _ => {
            let mut current = pending.to_vec();
            let mut rebased = Vec::with_capacity(applied.len());
            for a in applied {
                let (after, next) = transform_sequences(std::slice::from_ref(a), &current);
                rebased.extend(after);
                current = next;
            }
            (rebased, current)
        }
    }
}

/// Split a replace into its delete and insert steps
pub fn decompose(op: &Operation) -> Vec<Operation> {
    match &op.edit {
        Edit::Replace {
            position,
            length,
            content,
        } => vec![
            op.with_edit(Edit::Delete {
                position: *position,
                length: *length,
            }),
            op.with_edit(Edit::Insert {
                position: *position,
                content: content.clone(),
            }),
        ],
        _ => vec![op.clone()],
    }
}

/// Fold replace steps back into a single replace when they still line up
fn recompose(original: &Operation, steps: Vec<Operation>) -> Vec<Operation> {
    if original.kind() != OperationKind::Replace {
        return steps;
    }
    if let [delete, insert] = steps.as_slice() {
        if let (Edit::Delete { position, length }, Edit::Insert { position: at, content }) =
            (&delete.edit, &insert.edit)
        {
            if position == at {
                return vec![original.with_edit(Edit::Replace {
                    position: *position,
                    length: *length,
                    content: content.clone(),
                })];
            }
        }
    }
    steps
}

fn start(position: i64) -> usize {
    position.max(0) as usize
}

/// Pairwise transform of primitive steps
fn include(applied: &Operation, pending: &Operation) -> Vec<Operation> {
    match (&applied.edit, &pending.edit) {
        (
            Edit::Insert {
                position: pa,
                content: inserted,
            },
            Edit::Insert { position: pb, .. },
        ) => {
            let (pa, pb) = (start(*pa), start(*pb));
            let shifted = pa < pb || (pa == pb && applied.precedes(pending));
            let position = if shifted { pb + char_len(inserted) } else { pb };
            vec![pending.with_edit(pending.edit.moved_to(position))]
        }

        (
            Edit::Insert {
                position: pa,
                content: inserted,
            },
            Edit::Delete {
                position: pb,
                length,
            },
        ) => {
            let (pa, pb, n) = (start(*pa), start(*pb), char_len(inserted));
            if pa <= pb {
                vec![pending.with_edit(pending.edit.moved_to(pb + n))]
            } else if pa >= pb.saturating_add(*length) {
                vec![pending.with_edit(pending.edit.moved_to(pb))]
            } else {
                let head = pa - pb;
                vec![
                    pending.with_edit(Edit::Delete {
                        position: pb as i64,
                        length: head,
                    }),
                    pending.with_edit(Edit::Delete {
                        position: (pb + n) as i64,
                        length: length - head,
                    }),
                ]
            }
        }

        (
            Edit::Delete {
                position: pa,
                length,
            },
            Edit::Insert { position: pb, .. },
        ) => {
            let (pa, pb) = (start(*pa), start(*pb));
            let position = if pb <= pa {
                pb
            } else if pb < pa.saturating_add(*length) {
                pa
            } else {
                pb - length
            };
            vec![pending.with_edit(pending.edit.moved_to(position))]
        }

        (
            Edit::Delete {
                position: pa,
                length: la,
            },
            Edit::Delete {
                position: pb,
                length: lb,
            },
        ) => {
            let (pa, pb) = (start(*pa), start(*pb));
            let (ea, eb) = (pa.saturating_add(*la), pb.saturating_add(*lb));
            let (position, length) = if eb <= pa {
                (pb, *lb)
            } else if pb >= ea {
                (pb - la, *lb)
            } else {
                let overlap = ea.min(eb) - pa.max(pb);
                (pa.min(pb), lb - overlap)
            };
            vec![pending.with_edit(Edit::Delete {
                position: position as i64,
                length,
            })]
        }

        // Replace never reaches here through `rebase`, but stays correct if it does
        _ => transform(applied, pending),
    }
}

/// Move a cursor past an applied operation
pub fn transform_cursor(cursor: usize, applied: &Operation) -> usize {
    match &applied.edit {
        Edit::Insert { position, content } => cursor_after_insert(cursor, start(*position), content),
        Edit::Delete { position, length } => cursor_after_delete(cursor, start(*position), *length),
        Edit::Replace {
            position,
            length,
            content,
        } => {
            let at = start(*position);
            cursor_after_insert(cursor_after_delete(cursor, at, *length), at, content)
        }
    }
}

/// Move a cursor past a sequence of applied operations
pub fn transform_cursor_through(cursor: usize, applied: &[Operation]) -> usize {
    applied
        .iter()
        .fold(cursor, |cursor, op| transform_cursor(cursor, op))
}

fn cursor_after_insert(cursor: usize, position: usize, content: &str) -> usize {
    if position <= cursor {
        cursor + char_len(content)
    } else {
        cursor
    }
}

fn cursor_after_delete(cursor: usize, position: usize, length: usize) -> usize {
    if cursor >= position.saturating_add(length) {
        cursor - length
    } else if cursor >= position {
        position
    } else {
        cursor
    }
}

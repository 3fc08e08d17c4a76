//! Bounded log of applied versions, used to rebase operations that were
//! written against older content.

use inkwell_ot::Operation;
use std::collections::VecDeque;

#[derive(Debug)]
struct Entry {
    /// Content length (chars) before this version was applied
    len_before: usize,
    /// The version's steps, in order
    steps: Vec<Operation>,
}

#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<Entry>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Oldest version an operation can still be based on
    pub fn oldest(&self, version: u64) -> u64 {
        version.saturating_sub(self.entries.len() as u64)
    }

    /// Record the steps that produced the next version
    pub fn record(&mut self, len_before: usize, steps: Vec<Operation>) {
        self.entries.push_back(Entry { len_before, steps });
    }

    /// Drop entries recorded after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Drop the oldest entries beyond the limit
    pub fn trim(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Content length at `base` and every step applied since, given the
    /// current `version` and its length. `None` when `base` is out of range.
    pub fn since(&self, base: u64, version: u64, len: usize) -> Option<(usize, Vec<Operation>)> {
        if base > version {
            return None;
        }
        let behind = usize::try_from(version - base).ok()?;
        if behind == 0 {
            return Some((len, Vec::new()));
        }
        let start = self.entries.len().checked_sub(behind)?;
        let steps = self
            .entries
            .iter()
            .skip(start)
            .flat_map(|entry| entry.steps.iter().cloned())
            .collect();
        Some((self.entries[start].len_before, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_collects_later_steps() {
        let mut history = History::new(8);
        history.record(5, vec![Operation::insert(0, "a")]);
        history.record(6, vec![Operation::delete(0, 1), Operation::delete(2, 1)]);

        let (len, steps) = history.since(0, 2, 4).unwrap();
        assert_eq!(len, 5);
        assert_eq!(steps.len(), 3);

        let (len, steps) = history.since(1, 2, 4).unwrap();
        assert_eq!(len, 6);
        assert_eq!(steps.len(), 2);

        let (len, steps) = history.since(2, 2, 4).unwrap();
        assert_eq!((len, steps.len()), (4, 0));
    }

    #[test]
    fn test_out_of_range_bases() {
        let mut history = History::new(8);
        history.record(0, vec![Operation::insert(0, "a")]);
        // Versions 0..=9 before this one are gone
        assert_eq!(history.oldest(11), 10);
        assert!(history.since(9, 11, 1).is_none());
        assert!(history.since(12, 11, 1).is_none());
    }

    #[test]
    fn test_trim_and_truncate() {
        let mut history = History::new(2);
        for _ in 0..3 {
            history.record(0, vec![Operation::insert(0, "a")]);
        }
        history.trim();
        assert_eq!(history.len(), 2);

        history.truncate(1);
        assert_eq!(history.len(), 1);
    }
}

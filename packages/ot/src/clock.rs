//! Lamport clock for the `clock` field of operations

use crate::Operation;

/// Monotonic logical clock.
///
/// Clients tick it for every local edit and observe the clock of every
/// operation they receive, so causally later edits always carry a larger
/// value than the edits they have seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.time
    }

    /// Advance for a local event and return the new time
    pub fn tick(&mut self) -> u64 {
        self.time += 1;
        self.time
    }

    /// Merge a remote time seen on an incoming operation
    pub fn observe(&mut self, remote: u64) {
        self.time = self.time.max(remote);
    }

    /// Stamp `op` with the next local time
    pub fn stamp(&mut self, op: Operation) -> Operation {
        let clock = self.tick();
        op.with_clock(clock)
    }
}

use slab::Slab;

use crate::task::Task;

struct Entry<D> {
    deadline: D,
    seq: u64,
    task: Task,
}

/// A set of tasks waiting for a deadline.
///
/// The deadline type is generic so the same queue serves the wall-clock
/// executor (`Instant`) and the virtual clock of the manual scheduler
/// (`Duration` since start). Tasks with equal deadlines are released in the
/// order they were inserted.
pub(crate) struct TimerQueue<D> {
    entries: Slab<Entry<D>>,
    seq: u64,
}

impl<D: Ord + Copy> TimerQueue<D> {
    pub const fn new() -> Self {
        Self {
            entries: Slab::new(),
            seq: 0,
        }
    }

    pub fn insert(&mut self, deadline: D, task: Task) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.insert(Entry {
            deadline,
            seq,
            task,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn earliest(&self) -> Option<(usize, D)> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| (e.deadline, e.seq))
            .map(|(key, e)| (key, e.deadline))
    }

    /// The deadline of the next timer to fire, if any.
    pub fn next_deadline(&self) -> Option<D> {
        self.earliest().map(|(_, deadline)| deadline)
    }

    /// Remove and return the next task whose deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: D) -> Option<Task> {
        match self.earliest() {
            Some((key, deadline)) if deadline <= now => Some(self.entries.remove(key).task),
            _ => None,
        }
    }
}

//! Generation-stamped checked set for graph traversal.
//!
//! Clearing bumps a counter instead of zeroing memory, so a pooled set costs
//! nothing per query once it has grown to the graph size.

use std::cell::RefCell;

#[derive(Debug)]
pub(crate) struct VisitedSet {
    stamps: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            stamps: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Start a new traversal over ids `0..capacity`.
    pub(crate) fn reset(&mut self, capacity: usize) {
        if capacity > self.stamps.len() {
            self.stamps.resize(capacity, 0);
        }
        if self.generation == u16::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Mark `id`. Returns `true` if it was not marked in this traversal.
    #[inline]
    pub(crate) fn insert(&mut self, id: u32) -> bool {
        let slot = &mut self.stamps[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }
}

thread_local! {
    static VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Run `f` with this thread's pooled set, reset for `capacity` ids.
pub(crate) fn with_visited<T>(capacity: usize, f: impl FnOnce(&mut VisitedSet) -> T) -> T {
    VISITED.with(|cell| match cell.try_borrow_mut() {
        Ok(mut visited) => {
            visited.reset(capacity);
            f(&mut visited)
        }
        // Re-entrant use on the same thread falls back to a private set.
        Err(_) => f(&mut VisitedSet::new(capacity)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_forgets_marks() {
        let mut vs = VisitedSet::new(4);
        vs.reset(4);
        assert!(vs.insert(2));
        assert!(!vs.insert(2));
        vs.reset(8);
        assert!(vs.insert(2));
        assert!(vs.insert(7));
    }

    #[test]
    fn generation_wraps() {
        let mut vs = VisitedSet::new(3);
        for _ in 0..(u16::MAX as usize + 5) {
            vs.reset(3);
        }
        assert!(vs.insert(1));
        assert!(!vs.insert(1));
        assert!(vs.insert(0));
    }

    #[test]
    fn nested_use_does_not_panic() {
        let inner = with_visited(4, |outer| {
            outer.insert(1);
            with_visited(4, |inner| inner.insert(1))
        });
        assert!(inner);
    }
}

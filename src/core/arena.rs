//! Identifier allocation for segments and synapses.
//!
//! Identifiers double as dense array indices during activity computation, so they are never
//! compacted or handed to a different entity. A destroyed entity keeps its identifier as a
//! tombstone until its owner reuses the slot.
//!
//! The arena tracks two numbers:
//! - `next`: one past the highest identifier ever allocated. Only `allocate` moves it.
//! - `live`: how many allocated entities are currently not destroyed.

/// Monotonic identifier counter with a separate live count.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdArena {
    next: usize,
    live: usize,
}

impl IdArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh identifier. Only used when no tombstone is available for reuse.
    #[inline]
    pub fn allocate(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        self.live += 1;
        id
    }

    /// Accounts for an entity becoming a tombstone. The identifier stays reserved.
    #[inline]
    pub fn release(&mut self) {
        assert!(self.live > 0, "Releasing an identifier while no entity is live");
        self.live -= 1;
    }

    /// Accounts for a tombstone being brought back to life under its old identifier.
    #[inline]
    pub fn reactivate(&mut self) {
        assert!(
            self.live < self.next,
            "Reactivating an identifier while every allocated entity is already live"
        );
        self.live += 1;
    }

    /// Number of currently live (non-destroyed) entities.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// One past the highest identifier ever allocated.
    #[inline]
    pub fn next_index(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_allocation_is_zero() {
        let mut arena = IdArena::new();

        assert_eq!(arena.allocate(), 0);
        assert_eq!(arena.allocate(), 1);
        assert_eq!(arena.live(), 2);
        assert_eq!(arena.next_index(), 2);
    }

    #[test]
    fn test_release_keeps_identifier_space() {
        let mut arena = IdArena::new();
        arena.allocate();
        arena.allocate();

        arena.release();
        assert_eq!(arena.live(), 1);

        // a fresh allocation never collides with the released slot
        assert_eq!(arena.allocate(), 2);
        assert_eq!(arena.live(), 2);
    }

    #[test]
    fn test_reactivate_restores_live_count() {
        let mut arena = IdArena::new();
        arena.allocate();
        arena.release();
        arena.reactivate();

        assert_eq!(arena.live(), 1);
        assert_eq!(arena.next_index(), 1);
    }

    #[test]
    #[should_panic]
    fn test_release_underflow_panics() {
        IdArena::new().release();
    }
}

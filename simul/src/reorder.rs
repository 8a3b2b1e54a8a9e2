//! Reorder Buffer

use std::collections::BTreeMap;

/// Restores sequence order for values that complete out of order. Values
/// are held until every lower sequence number has been inserted.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Next sequence number to release.
    next: u64,

    /// Values waiting for a lower sequence number.
    held: BTreeMap<u64, T>,
}

impl<T> ReorderBuffer<T> {
    /// Create a buffer releasing from sequence number 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a buffer releasing from a given sequence number.
    ///
    /// * `first` - First sequence number.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: first,
            held: BTreeMap::new(),
        }
    }

    /// Insert a value and return the values that are now in order. Sequence
    /// numbers already released or already held are ignored.
    ///
    /// * `seq`   - Sequence number.
    /// * `value` - The value.
    pub fn insert(&mut self, seq: u64, value: T) -> Vec<(u64, T)> {
        if seq < self.next || self.held.contains_key(&seq) {
            warn!("Ignoring duplicate sequence number {}", seq);
            return vec![];
        }
        self.held.insert(seq, value);

        let mut ready = vec![];
        while let Some(v) = self.held.remove(&self.next) {
            ready.push((self.next, v));
            self.next += 1;
        }
        ready
    }

    /// Returns the next sequence number to be released.
    pub fn next_seq(&self) -> u64 {
        self.next
    }

    /// Returns the number of values held.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Returns true if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn values_are_held_until_the_gap_closes() {
        let mut rb = ReorderBuffer::new();
        assert!(rb.insert(2, 'c').is_empty());
        assert!(rb.insert(1, 'b').is_empty());
        assert_eq!(rb.held(), 2);
        assert_eq!(rb.insert(0, 'a'), vec![(0, 'a'), (1, 'b'), (2, 'c')]);
        assert!(rb.is_empty());
        assert_eq!(rb.next_seq(), 3);
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut rb = ReorderBuffer::starting_at(5);
        assert!(rb.insert(4, 0).is_empty());
        assert!(rb.insert(6, 1).is_empty());
        assert!(rb.insert(6, 2).is_empty());
        assert_eq!(rb.insert(5, 3), vec![(5, 3), (6, 1)]);
    }

    proptest! {
        #[test]
        fn any_arrival_order_is_released_in_sequence(
            order in Just((0..64u64).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut rb = ReorderBuffer::new();
            let mut released = vec![];
            for seq in order {
                released.extend(rb.insert(seq, seq * 10).into_iter());
            }
            prop_assert_eq!(released.len(), 64);
            for (i, (seq, v)) in released.iter().enumerate() {
                prop_assert_eq!(*seq, i as u64);
                prop_assert_eq!(*v, i as u64 * 10);
            }
        }
    }
}

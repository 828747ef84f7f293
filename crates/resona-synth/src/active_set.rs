//! O(1) tracking of live slots in a fixed-capacity pool.
//!
//! [`ActiveIndexSet`] keeps every slot index in one permutation array:
//! the first `len` entries are active, the rest are free. Insert, remove,
//! membership and "give me any free slot" are all constant time, and the
//! active entries form a dense slice that render loops iterate directly
//! instead of scanning the whole pool.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Sparse set over the indices `0..capacity`.
///
/// ```rust
/// use resona_synth::ActiveIndexSet;
///
/// let mut set = ActiveIndexSet::new(4);
/// let a = set.acquire().unwrap();
/// set.insert(3);
/// assert_eq!(set.len(), 2);
/// set.remove(a);
/// assert_eq!(set.as_slice(), &[3]);
/// ```
#[derive(Debug, Clone)]
pub struct ActiveIndexSet {
    /// Permutation of all indices; `dense[..len]` are active.
    dense: Vec<usize>,
    /// `position[i]` is where index `i` currently sits in `dense`.
    position: Vec<usize>,
    len: usize,
}

impl ActiveIndexSet {
    /// Create an empty set able to hold `capacity` indices.
    pub fn new(capacity: usize) -> Self {
        Self {
            dense: (0..capacity).collect(),
            position: (0..capacity).collect(),
            len: 0,
        }
    }

    /// Maximum number of indices.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.dense.len()
    }

    /// Number of active indices.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when no index is active.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` when every index is active.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.dense.len()
    }

    /// Active indices, in no particular order.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.dense[..self.len]
    }

    /// The `n`-th active index. `n` must be below [`len`](Self::len).
    #[inline]
    pub fn get(&self, n: usize) -> usize {
        self.dense[n]
    }

    /// Whether `index` is active. Out-of-range indices are never active.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.position.len() && self.position[index] < self.len
    }

    /// Activate and return some free index, or `None` when full.
    #[inline]
    pub fn acquire(&mut self) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let index = self.dense[self.len];
        self.len += 1;
        Some(index)
    }

    /// Activate a specific index. Returns `false` if it was already active
    /// or out of range.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= self.position.len() || self.contains(index) {
            return false;
        }
        self.swap_positions(self.position[index], self.len);
        self.len += 1;
        true
    }

    /// Deactivate `index`. Returns `false` if it was not active.
    ///
    /// The last active index takes the removed one's place, so callers
    /// walking [`as_slice`](Self::as_slice) by position must not advance
    /// after a removal.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.len -= 1;
        self.swap_positions(self.position[index], self.len);
        true
    }

    /// Deactivate everything.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn swap_positions(&mut self, a: usize, b: usize) {
        self.dense.swap(a, b);
        self.position[self.dense[a]] = a;
        self.position[self.dense[b]] = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_full() {
        let mut set = ActiveIndexSet::new(3);
        let mut seen = [false; 3];
        for _ in 0..3 {
            let i = set.acquire().unwrap();
            assert!(!seen[i]);
            seen[i] = true;
        }
        assert!(set.is_full());
        assert_eq!(set.acquire(), None);
    }

    #[test]
    fn test_remove_swaps_last_in() {
        let mut set = ActiveIndexSet::new(8);
        for i in [5, 1, 7] {
            assert!(set.insert(i));
        }
        assert!(set.remove(5));
        assert_eq!(set.as_slice(), &[7, 1]);
        assert!(!set.contains(5));
        assert!(!set.remove(5));
    }

    #[test]
    fn test_insert_rejects_duplicates_and_out_of_range() {
        let mut set = ActiveIndexSet::new(2);
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(!set.insert(2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_reacquire_after_clear() {
        let mut set = ActiveIndexSet::new(4);
        set.insert(2);
        set.insert(0);
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(2));
        for _ in 0..4 {
            assert!(set.acquire().is_some());
        }
    }

    #[test]
    fn test_positions_stay_consistent() {
        let mut set = ActiveIndexSet::new(16);
        for i in 0..16 {
            set.insert((i * 7) % 16);
        }
        for i in (0..16).step_by(3) {
            set.remove(i);
        }
        for (pos, &idx) in set.as_slice().iter().enumerate() {
            assert_eq!(set.position[idx], pos);
        }
        assert_eq!(set.len(), 16 - 6);
    }
}

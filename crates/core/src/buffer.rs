//! Fixed-capacity FIFO used for the live display series.

use std::collections::VecDeque;

/// Number of samples kept for live display.
pub const DISPLAY_CAPACITY: usize = 30;

/// Ring buffer that keeps the most recent `capacity` entries in arrival
/// order, evicting the oldest on overflow.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for RollingBuffer<T> {
    fn default() -> Self {
        Self::new(DISPLAY_CAPACITY)
    }
}

impl<T> RollingBuffer<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> RollingBuffer<T> {
    /// Oldest-first copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut buf = RollingBuffer::new(5);
        for i in 0..3 {
            buf.append(i);
        }
        assert_eq!(buf.snapshot(), vec![0, 1, 2]);
        assert_eq!(buf.latest(), Some(&2));
    }

    #[test]
    fn never_exceeds_display_capacity() {
        let mut buf = RollingBuffer::default();
        for i in 0..100 {
            buf.append(i);
            assert!(buf.len() <= DISPLAY_CAPACITY);
        }
        assert_eq!(buf.len(), DISPLAY_CAPACITY);
    }

    #[test]
    fn thirty_first_append_evicts_the_first() {
        let mut buf = RollingBuffer::default();
        for i in 1..=31 {
            buf.append(i);
        }
        let snap = buf.snapshot();
        assert!(!snap.contains(&1));
        assert!(snap.contains(&31));
        assert_eq!(snap.first(), Some(&2));
        assert_eq!(snap.len(), 30);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buf = RollingBuffer::new(0);
        buf.append("a");
        buf.append("b");
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.snapshot(), vec!["b"]);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = RollingBuffer::new(3);
        buf.append(1);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.latest(), None);
    }
}

//! Specialized collection types

pub use slotmap::{new_key_type, SecondaryMap, SlotMap};

/// Fixed-capacity allocator of slot indices.
///
/// Fresh indices are handed out in order until `capacity` is reached;
/// released indices are reused first, most recent release on top.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    capacity: usize,
    next_fresh: usize,
    released: Vec<usize>,
}

impl SlotAllocator {
    /// Allocator for indices `0..capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_fresh: 0,
            released: Vec::new(),
        }
    }

    /// Take a free index, or `None` when every slot is in use
    pub fn acquire(&mut self) -> Option<usize> {
        if let Some(index) = self.released.pop() {
            return Some(index);
        }
        (self.next_fresh < self.capacity).then(|| {
            self.next_fresh += 1;
            self.next_fresh - 1
        })
    }

    /// Give `index` back. Returns false for indices never handed out or
    /// already released.
    pub fn release(&mut self, index: usize) -> bool {
        if index >= self.next_fresh || self.released.contains(&index) {
            return false;
        }
        self.released.push(index);
        true
    }

    /// True if [`SlotAllocator::acquire`] would succeed
    pub fn has_room(&self) -> bool {
        !self.released.is_empty() || self.next_fresh < self.capacity
    }

    /// Number of indices currently handed out
    pub fn in_use(&self) -> usize {
        self.next_fresh - self.released.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_slots_come_back_first() {
        let mut slots = SlotAllocator::new(2);
        let a = slots.acquire();
        let b = slots.acquire();
        assert_eq!((a, b), (Some(0), Some(1)));
        assert!(!slots.has_room());
        assert_eq!(slots.acquire(), None);

        assert!(slots.release(0));
        assert!(!slots.release(0));
        assert!(!slots.release(5));
        assert_eq!(slots.in_use(), 1);
        assert_eq!(slots.acquire(), Some(0));
    }
}

//! A fixed-capacity bitset used to track which slots are alive.

use bit_vec::BitVec;

/// A set of slot indices backed by a `BitVec`.
///
/// The capacity is fixed on creation. `scan` walks whole blocks at a time so
/// iterating a sparse set does not touch every bit.
#[derive(Clone, Debug)]
pub struct SlotSet {
    bits: BitVec,
    count: usize,
}

impl SlotSet {
    /// Create an empty set able to hold indices `0..capacity`.
    pub fn new(capacity: usize) -> SlotSet {
        SlotSet {
            bits: BitVec::from_elem(capacity, false),
            count: 0,
        }
    }

    /// Return the number of indices this set can hold.
    pub fn capacity(&self) -> usize {
        self.bits.len()
    }

    /// Return the number of indices currently set.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no indices are set.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mark `index` as present.
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn set(&mut self, index: usize) {
        if !self.bits[index] {
            self.bits.set(index, true);
            self.count += 1;
        }
    }

    /// Mark `index` as absent.
    ///
    /// # Panics
    /// If `index` is out of range.
    pub fn clear(&mut self, index: usize) {
        if self.bits[index] {
            self.bits.set(index, false);
            self.count -= 1;
        }
    }

    /// Returns true if `index` is present. Out of range indices are absent.
    pub fn test(&self, index: usize) -> bool {
        self.bits.get(index).unwrap_or(false)
    }

    /// Find the first present index at or after `from`.
    pub fn scan(&self, from: usize) -> Option<usize> {
        if from >= self.bits.len() {
            return None;
        }

        let blocks = self.bits.storage();
        let block_bits = 32;
        let mut block_idx = from / block_bits;
        let mut block = blocks[block_idx] & (!0u32 << (from % block_bits));

        loop {
            if block != 0 {
                let index = block_idx * block_bits + block.trailing_zeros() as usize;
                // Bits past `len` are always zero in a `BitVec`.
                return Some(index);
            }

            block_idx += 1;
            if block_idx >= blocks.len() {
                return None;
            }
            block = blocks[block_idx];
        }
    }

    /// Iterate over all present indices in ascending order.
    pub fn iter(&self) -> SlotSetIter<'_> {
        SlotSetIter {
            set: self,
            next: 0,
        }
    }
}

/// An iterator over the indices in a `SlotSet`.
pub struct SlotSetIter<'a> {
    set: &'a SlotSet,
    next: usize,
}

impl<'a> Iterator for SlotSetIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let found = self.set.scan(self.next)?;
        self.next = found + 1;
        Some(found)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_clear() {
        let mut set = SlotSet::new(100);
        assert!(set.is_empty());

        set.set(3);
        set.set(3);
        set.set(64);
        assert_eq!(set.len(), 2);
        assert!(set.test(3));
        assert!(set.test(64));
        assert!(!set.test(4));
        assert!(!set.test(1000));

        set.clear(3);
        set.clear(3);
        assert_eq!(set.len(), 1);
        assert!(!set.test(3));
    }

    #[test]
    fn test_scan() {
        let mut set = SlotSet::new(200);
        for idx in [0, 31, 32, 33, 150, 199].iter() {
            set.set(*idx);
        }

        assert_eq!(set.scan(0), Some(0));
        assert_eq!(set.scan(1), Some(31));
        assert_eq!(set.scan(32), Some(32));
        assert_eq!(set.scan(34), Some(150));
        assert_eq!(set.scan(151), Some(199));
        assert_eq!(set.scan(200), None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 31, 32, 33, 150, 199]);
    }

    #[test]
    fn test_scan_empty() {
        let set = SlotSet::new(70);
        assert_eq!(set.scan(0), None);
        assert_eq!(set.iter().count(), 0);
    }
}

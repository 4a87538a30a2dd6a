//! Occupancy bitmap for slab slots.

/// One bit per slot: 0 = free, 1 = allocated.
///
/// Not synchronized; the owning slab allocator's mutex guards it.
#[derive(Debug, Clone)]
pub struct SlotBitmap {
    words: Box<[u64]>,
    num_slots: usize,
}

impl SlotBitmap {
    pub fn new(num_slots: usize) -> Self {
        let num_words = num_slots.div_ceil(64);
        Self {
            words: vec![0u64; num_words].into_boxed_slice(),
            num_slots,
        }
    }

    /// First free slot, scanning from the lowest index.
    pub fn first_free(&self) -> Option<usize> {
        for (word_idx, &word) in self.words.iter().enumerate() {
            if word == u64::MAX {
                continue;
            }
            let slot = word_idx * 64 + (!word).trailing_zeros() as usize;
            return (slot < self.num_slots).then_some(slot);
        }
        None
    }

    #[inline]
    pub fn set(&mut self, slot: usize) {
        debug_assert!(slot < self.num_slots);
        self.words[slot / 64] |= 1u64 << (slot % 64);
    }

    #[inline]
    pub fn clear(&mut self, slot: usize) {
        debug_assert!(slot < self.num_slots);
        self.words[slot / 64] &= !(1u64 << (slot % 64));
    }

    #[inline]
    pub fn is_set(&self, slot: usize) -> bool {
        slot < self.num_slots && self.words[slot / 64] & (1u64 << (slot % 64)) != 0
    }

    /// Number of allocated slots
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn len(&self) -> usize {
        self.num_slots
    }

    pub fn is_empty(&self) -> bool {
        self.num_slots == 0
    }
}

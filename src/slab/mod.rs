//! Fixed-size block allocator backed by bitmap-tracked slabs.
//!
//! # Architecture
//!
//! ```text
//! SlabAllocator (object_size = 64, objects_per_slab = 4)
//!   slabs:   [0: Slab ■■□□] [1: Slab ■■■■] [2: vacant] [3: Slab □□□□]
//!   partial: [0]
//!   full:    [1]
//!   empty:   [3]          (cached, at most `max_empty_slabs`)
//! ```
//!
//! Slabs live in an index-addressed table and the three lists hold table
//! indices. One mutex guards the table, the lists and every bitmap.
//!
//! Freeing a block finds its slab by scanning `partial` then `full` for the
//! slab whose address range contains the block, so `free` is O(slabs).
//! Blocks carry no back-pointer to their slab.

mod bitmap;

pub use bitmap::SlotBitmap;

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::debug;

/// Empty slabs kept for reuse before further emptied slabs are released
pub const DEFAULT_MAX_EMPTY_SLABS: usize = 2;

/// Object sizes are rounded up to this multiple
pub const OBJECT_ALIGN: usize = 8;

/// Alignment of each slab's object storage
pub const SLAB_ALIGN: usize = 16;

/// Which list a slab currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabList {
    Partial,
    Full,
    Empty,
}

struct Slab {
    memory: NonNull<u8>,
    layout: Layout,
    bitmap: SlotBitmap,
    used_count: usize,
}

// SAFETY: a slab exclusively owns its memory block.
unsafe impl Send for Slab {}

impl Slab {
    fn new(layout: Layout, objects: usize) -> Result<Self> {
        // SAFETY: the allocator never builds a zero-sized slab layout.
        let raw = unsafe { alloc::alloc(layout) };
        let memory = NonNull::new(raw).ok_or(Error::Memory)?;
        Ok(Self {
            memory,
            layout,
            bitmap: SlotBitmap::new(objects),
            used_count: 0,
        })
    }

    #[inline]
    fn contains(&self, addr: usize) -> bool {
        let start = self.memory.as_ptr() as usize;
        addr >= start && addr < start + self.layout.size()
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: allocated in `Slab::new` with this layout.
        unsafe { alloc::dealloc(self.memory.as_ptr(), self.layout) }
    }
}

#[derive(Default)]
struct SlabState {
    slabs: Vec<Option<Slab>>,
    vacant: Vec<usize>,
    // The last element of each list is its head.
    partial: Vec<usize>,
    full: Vec<usize>,
    empty: Vec<usize>,
    allocations: u64,
    deallocations: u64,
    slab_allocations: u64,
    slab_releases: u64,
}

impl SlabState {
    fn insert(&mut self, slab: Slab) -> usize {
        match self.vacant.pop() {
            Some(idx) => {
                self.slabs[idx] = Some(slab);
                idx
            }
            None => {
                self.slabs.push(Some(slab));
                self.slabs.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        if self.slabs[idx].take().is_some() {
            self.vacant.push(idx);
            self.slab_releases += 1;
        }
    }

    fn slab_mut(&mut self, idx: usize) -> Result<&mut Slab> {
        self.slabs
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvariantViolation(format!("slab {} is vacant", idx)))
    }

    fn list_mut(&mut self, list: SlabList) -> &mut Vec<usize> {
        match list {
            SlabList::Partial => &mut self.partial,
            SlabList::Full => &mut self.full,
            SlabList::Empty => &mut self.empty,
        }
    }

    fn move_slab(&mut self, idx: usize, from: SlabList, to: SlabList) {
        self.unlink(idx, from);
        self.list_mut(to).push(idx);
    }

    fn unlink(&mut self, idx: usize, from: SlabList) {
        let list = self.list_mut(from);
        if let Some(pos) = list.iter().rposition(|&i| i == idx) {
            list.remove(pos);
        }
    }

    /// Scan partial then full for the slab containing `addr`
    fn find_owner(&self, addr: usize) -> Option<(usize, SlabList)> {
        let lists = [
            (&self.partial, SlabList::Partial),
            (&self.full, SlabList::Full),
        ];
        for (list, kind) in lists {
            for &idx in list.iter().rev() {
                if let Some(slab) = &self.slabs[idx] {
                    if slab.contains(addr) {
                        return Some((idx, kind));
                    }
                }
            }
        }
        None
    }
}

/// Point-in-time view of a slab allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabStats {
    pub object_size: usize,
    pub objects_per_slab: usize,
    pub allocations: u64,
    pub deallocations: u64,
    pub slab_allocations: u64,
    pub slab_releases: u64,
    pub partial_slabs: usize,
    pub full_slabs: usize,
    pub empty_slabs: usize,
    pub live_objects: usize,
}

/// Allocator for blocks of one fixed size, shared across threads.
pub struct SlabAllocator {
    object_size: usize,
    objects_per_slab: usize,
    slab_layout: Layout,
    max_empty_slabs: usize,
    state: Mutex<SlabState>,
}

impl SlabAllocator {
    /// Create an allocator for `object_size`-byte blocks, `objects_per_slab`
    /// per slab. The object size is rounded up to a multiple of 8.
    pub fn new(object_size: usize, objects_per_slab: usize) -> Result<Self> {
        Self::with_empty_cache(object_size, objects_per_slab, DEFAULT_MAX_EMPTY_SLABS)
    }

    pub fn with_empty_cache(
        object_size: usize,
        objects_per_slab: usize,
        max_empty_slabs: usize,
    ) -> Result<Self> {
        if object_size == 0 {
            return Err(Error::InvalidSize(object_size));
        }
        if objects_per_slab == 0 {
            return Err(Error::InvalidSize(objects_per_slab));
        }

        let object_size = object_size
            .checked_next_multiple_of(OBJECT_ALIGN)
            .ok_or(Error::InvalidSize(object_size))?;
        let slab_bytes = object_size
            .checked_mul(objects_per_slab)
            .ok_or(Error::InvalidSize(objects_per_slab))?;
        let slab_layout = Layout::from_size_align(slab_bytes, SLAB_ALIGN)
            .map_err(|_| Error::InvalidSize(slab_bytes))?;

        Ok(Self {
            object_size,
            objects_per_slab,
            slab_layout,
            max_empty_slabs,
            state: Mutex::new(SlabState::default()),
        })
    }

    /// Hand out one block.
    pub fn alloc(&self) -> Result<NonNull<u8>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let idx = match state.partial.last() {
            Some(&idx) => idx,
            None => match state.empty.pop() {
                Some(idx) => {
                    state.partial.push(idx);
                    idx
                }
                None => {
                    let slab = Slab::new(self.slab_layout, self.objects_per_slab)?;
                    let idx = state.insert(slab);
                    state.slab_allocations += 1;
                    state.partial.push(idx);
                    debug!(
                        object_size = self.object_size,
                        slab = idx,
                        bytes = self.slab_layout.size(),
                        "Allocated new slab"
                    );
                    idx
                }
            },
        };

        let objects_per_slab = self.objects_per_slab;
        let slab = state.slab_mut(idx)?;
        let slot = slab.bitmap.first_free().ok_or_else(|| {
            Error::InvariantViolation(format!("partial slab {} has no free slot", idx))
        })?;
        slab.bitmap.set(slot);
        slab.used_count += 1;
        let saturated = slab.used_count == objects_per_slab;
        // SAFETY: slot < objects_per_slab, so the offset stays inside the slab.
        let ptr = unsafe { NonNull::new_unchecked(slab.memory.as_ptr().add(slot * self.object_size)) };

        if saturated {
            state.move_slab(idx, SlabList::Partial, SlabList::Full);
        }
        state.allocations += 1;

        Ok(ptr)
    }

    /// Return a block obtained from [`SlabAllocator::alloc`].
    ///
    /// Errors leave the allocator untouched:
    /// - [`Error::UnknownBlock`] when no partial or full slab contains `ptr`;
    /// - [`Error::MisalignedBlock`] when `ptr` is inside a slab but not at
    ///   the start of a slot;
    /// - [`Error::DoubleFree`] when the slot is already free.
    pub fn free(&self, ptr: NonNull<u8>) -> Result<()> {
        let addr = ptr.as_ptr() as usize;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (idx, list) = state.find_owner(addr).ok_or(Error::UnknownBlock)?;
        let object_size = self.object_size;
        let total = self.objects_per_slab;

        let slab = state.slab_mut(idx)?;
        let offset = addr - slab.memory.as_ptr() as usize;
        if offset % object_size != 0 {
            return Err(Error::MisalignedBlock { offset });
        }
        let slot = offset / object_size;
        if !slab.bitmap.is_set(slot) {
            return Err(Error::DoubleFree { slot });
        }

        slab.bitmap.clear(slot);
        slab.used_count -= 1;
        let used = slab.used_count;
        state.deallocations += 1;

        if used == 0 {
            if state.empty.len() < self.max_empty_slabs {
                state.move_slab(idx, list, SlabList::Empty);
            } else {
                state.unlink(idx, list);
                state.release(idx);
                debug!(
                    object_size = self.object_size,
                    slab = idx,
                    "Released empty slab"
                );
            }
        } else if used == total - 1 && list == SlabList::Full {
            state.move_slab(idx, SlabList::Full, SlabList::Partial);
        }

        Ok(())
    }

    /// Block size after rounding
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn objects_per_slab(&self) -> usize {
        self.objects_per_slab
    }

    pub fn max_empty_slabs(&self) -> usize {
        self.max_empty_slabs
    }

    /// Whether `ptr` lies inside any slab currently held by this allocator
    pub fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.state
            .lock()
            .slabs
            .iter()
            .flatten()
            .any(|slab| slab.contains(addr))
    }

    pub fn stats(&self) -> SlabStats {
        let state = self.state.lock();
        SlabStats {
            object_size: self.object_size,
            objects_per_slab: self.objects_per_slab,
            allocations: state.allocations,
            deallocations: state.deallocations,
            slab_allocations: state.slab_allocations,
            slab_releases: state.slab_releases,
            partial_slabs: state.partial.len(),
            full_slabs: state.full.len(),
            empty_slabs: state.empty.len(),
            live_objects: state.slabs.iter().flatten().map(|s| s.used_count).sum(),
        }
    }

    /// Verify bitmap counts and list membership for every slab.
    pub fn check_invariants(&self) -> Result<()> {
        let state = self.state.lock();
        let mut seen = vec![false; state.slabs.len()];

        let lists = [
            (&state.partial, SlabList::Partial),
            (&state.full, SlabList::Full),
            (&state.empty, SlabList::Empty),
        ];
        for (list, kind) in lists {
            for &idx in list.iter() {
                let slab = state.slabs.get(idx).and_then(Option::as_ref).ok_or_else(|| {
                    Error::InvariantViolation(format!("{:?} list references vacant slab {}", kind, idx))
                })?;
                if std::mem::replace(&mut seen[idx], true) {
                    return Err(Error::InvariantViolation(format!(
                        "slab {} appears in more than one list",
                        idx
                    )));
                }

                let popcount = slab.bitmap.count_ones();
                if popcount != slab.used_count {
                    return Err(Error::InvariantViolation(format!(
                        "slab {} used_count {} but bitmap has {} bits set",
                        idx, slab.used_count, popcount
                    )));
                }

                let expected = match slab.used_count {
                    0 => SlabList::Empty,
                    n if n == self.objects_per_slab => SlabList::Full,
                    _ => SlabList::Partial,
                };
                if expected != kind {
                    return Err(Error::InvariantViolation(format!(
                        "slab {} with {} live objects is on the {:?} list",
                        idx, slab.used_count, kind
                    )));
                }
            }
        }

        for (idx, slab) in state.slabs.iter().enumerate() {
            if slab.is_some() && !seen[idx] {
                return Err(Error::InvariantViolation(format!(
                    "slab {} is not on any list",
                    idx
                )));
            }
        }
        if state.empty.len() > self.max_empty_slabs {
            return Err(Error::InvariantViolation(format!(
                "{} empty slabs cached, cap is {}",
                state.empty.len(),
                self.max_empty_slabs
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SlabAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("object_size", &self.object_size)
            .field("objects_per_slab", &self.objects_per_slab)
            .field("max_empty_slabs", &self.max_empty_slabs)
            .finish()
    }
}

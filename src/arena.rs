//! Bump arena for per-request scratch memory.
//!
//! An [`Arena`] hands out regions from one fixed `bumpalo` chunk by advancing
//! an offset. Individual regions are never freed; [`Arena::reset`] reclaims the
//! whole chunk in O(1) and bumps the generation counter.
//!
//! Regions handed out through the typed helpers borrow the arena, and
//! `reset` takes `&mut self`, so the borrow checker rejects any use of them
//! after a reset. Raw pointers from [`Arena::alloc`] and
//! [`Arena::alloc_aligned`] carry no such guarantee: they are logically dead
//! once the arena is reset or dropped, and nothing checks that at runtime.
//! Compare [`Arena::generation`] values to tell generations apart.

use crate::error::{Error, Result};
use bumpalo::Bump;
use std::alloc::Layout;
use std::cell::Cell;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

/// Alignment of every region returned by [`Arena::alloc`]
pub const ARENA_ALIGN: usize = 8;

#[inline(always)]
const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Single-owner bump allocator over one fixed [`Bump`] chunk.
///
/// The chunk is reserved up front and the bump's allocation limit pins it,
/// so the arena never grows. `used` tracks the logical offset against
/// `capacity`; it only moves when the chunk actually hands out a region.
///
/// `Arena` is `Send` but not `Sync`: one worker owns it at a time.
pub struct Arena {
    bump: Bump,
    capacity: usize,
    used: Cell<usize>,
    generation: u64,
}

impl Arena {
    /// Create an arena with `size` bytes of capacity.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || Layout::from_size_align(size, ARENA_ALIGN).is_err() {
            return Err(Error::InvalidSize(size));
        }
        let bump = Bump::try_with_capacity(size).map_err(|_| Error::Memory)?;
        bump.set_allocation_limit(Some(bump.allocated_bytes()));

        Ok(Self {
            bump,
            capacity: size,
            used: Cell::new(0),
            generation: 0,
        })
    }

    /// Allocate `size` bytes aligned to [`ARENA_ALIGN`].
    ///
    /// Returns `None` when `size` is zero or the arena cannot fit the
    /// request; the offset is left unchanged in that case.
    #[inline]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = align_up(size, ARENA_ALIGN)?;
        self.bump(size, ARENA_ALIGN)
    }

    /// Allocate `size` bytes whose address is a multiple of `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two. A zero `size` or
    /// `alignment` returns `None`.
    #[inline]
    pub fn alloc_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 || alignment == 0 {
            return None;
        }
        assert!(
            alignment.is_power_of_two(),
            "arena alignment must be a power of two, got {}",
            alignment
        );
        self.bump(size, alignment)
    }

    fn bump(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let start = align_up(self.used.get(), alignment)?;
        let end = start.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        let layout = Layout::from_size_align(size, alignment).ok()?;
        let ptr = self.bump.try_alloc_layout(layout).ok()?;
        self.used.set(end);
        Some(ptr)
    }

    /// Move `value` into the arena.
    ///
    /// The value is never dropped; use this for plain data.
    pub fn alloc_value<T>(&self, value: T) -> Option<&mut T> {
        let size = mem::size_of::<T>().max(1);
        let ptr = self.alloc_aligned(size, mem::align_of::<T>())?.cast::<T>();
        // SAFETY: the region is fresh, correctly aligned and large enough for
        // T; it stays valid for as long as `self` is borrowed.
        unsafe {
            ptr.as_ptr().write(value);
            Some(&mut *ptr.as_ptr())
        }
    }

    /// Copy a slice into the arena.
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Option<&mut [T]> {
        let size = mem::size_of_val(src).max(1);
        let ptr = self.alloc_aligned(size, mem::align_of::<T>())?.cast::<T>();
        // SAFETY: fresh, aligned region of at least `src.len()` elements.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Some(std::slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Copy a string into the arena.
    pub fn alloc_str(&self, src: &str) -> Option<&mut str> {
        let bytes = self.alloc_slice_copy(src.as_bytes())?;
        // SAFETY: the bytes were copied from a valid `str`.
        Some(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Reclaim every region in O(1). Memory is not zeroed.
    #[inline]
    pub fn reset(&mut self) {
        self.bump.reset();
        self.used.set(0);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Free bytes left in the current generation
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resets performed so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `ptr` points into a region handed out since the last reset
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        // SAFETY: only chunk bounds are read; nothing allocates meanwhile.
        unsafe { self.bump.iter_allocated_chunks_raw() }.any(|(start, len)| {
            let start = start as usize;
            addr >= start && addr < start + len
        })
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("used", &self.used.get())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_eight_byte_aligned() {
        let arena = Arena::new(256).unwrap();
        let a = arena.alloc(3).unwrap();
        let b = arena.alloc(5).unwrap();
        assert_eq!(a.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % ARENA_ALIGN, 0);
        assert_eq!((b.as_ptr() as usize).abs_diff(a.as_ptr() as usize), 8);
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn test_exhaustion_leaves_offset_unchanged() {
        let arena = Arena::new(32).unwrap();
        assert!(arena.alloc(24).is_some());
        assert!(arena.alloc(16).is_none());
        assert_eq!(arena.used(), 24);
        assert_eq!(arena.remaining(), 8);
        assert!(arena.alloc(8).is_some());
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn test_zero_size_requests_fail() {
        let arena = Arena::new(64).unwrap();
        assert!(arena.alloc(0).is_none());
        assert!(arena.alloc_aligned(0, 8).is_none());
        assert!(arena.alloc_aligned(8, 0).is_none());
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_alloc_aligned_respects_alignment() {
        let arena = Arena::new(1024).unwrap();
        arena.alloc_aligned(1, 1).unwrap();
        let p = arena.alloc_aligned(10, 64).unwrap();
        assert_eq!(p.as_ptr() as usize % 64, 0);
        assert!(arena.contains(p.as_ptr()));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_alloc_aligned_rejects_non_power_of_two() {
        let arena = Arena::new(64).unwrap();
        let _ = arena.alloc_aligned(8, 12);
    }

    #[test]
    fn test_reset_bumps_generation() {
        let mut arena = Arena::new(128).unwrap();
        arena.alloc(100).unwrap();
        let before = arena.generation();

        arena.reset();

        assert_eq!(arena.remaining(), arena.capacity());
        assert_eq!(arena.generation(), before + 1);
    }

    #[test]
    fn test_typed_helpers() {
        let arena = Arena::new(256).unwrap();
        let value = arena.alloc_value(0xdead_beef_u64).unwrap();
        *value += 1;
        assert_eq!(*value, 0xdead_bef0);

        let slice = arena.alloc_slice_copy(&[1u32, 2, 3]).unwrap();
        assert_eq!(slice, &[1, 2, 3]);

        let s = arena.alloc_str("hello").unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_chunk_is_pinned_to_capacity() {
        let mut arena = Arena::new(512).unwrap();
        let mut regions = 0;
        while arena.alloc_aligned(40, 64).is_some() {
            regions += 1;
        }
        assert!(regions > 0 && regions <= 512 / 64);
        assert!(arena.used() <= arena.capacity());
        assert!(arena.alloc(4096).is_none());

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(arena.alloc(512).is_some());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(Arena::new(0), Err(Error::InvalidSize(0))));
    }
}

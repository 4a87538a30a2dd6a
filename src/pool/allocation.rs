//! Handles for live pool allocations.
//!
//! Every allocation records where it came from, so `free` never has to
//! re-derive a size class from a caller-supplied size.

use super::size_class::SIZE_CLASSES;
use super::Ladder;
use crate::error::{Error, Result};
use std::alloc::Layout;
use std::fmt;
use std::ptr::{self, NonNull};
use std::str::Utf8Error;
use std::sync::Arc;

/// Where a block's memory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    /// A slot of the slab allocator for `class`, handed out by the pool
    /// initialisation identified by `epoch`
    Pooled { class: usize, epoch: u64 },
    /// The platform allocator
    Direct { layout: Layout },
}

/// A live block of pool memory.
///
/// Move-only: return it with [`MemoryPool::free`](super::MemoryPool::free).
/// Dropping it leaks the block. Contents start uninitialized except where
/// the constructor says otherwise (`calloc`, `strdup`).
///
/// A pooled block holds a strong reference to the slabs it was carved from,
/// so its memory stays valid across `shutdown`, re-`init` and dropping the
/// pool itself.
#[must_use = "dropping an Allocation leaks it; return it with MemoryPool::free"]
pub struct Allocation {
    ptr: NonNull<u8>,
    size: usize,
    origin: BlockOrigin,
    ladder: Option<Arc<Ladder>>,
}

// SAFETY: the handle is the unique owner of its block.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    pub(crate) fn pooled(
        ptr: NonNull<u8>,
        size: usize,
        class: usize,
        ladder: &Arc<Ladder>,
    ) -> Self {
        Self {
            ptr,
            size,
            origin: BlockOrigin::Pooled {
                class,
                epoch: ladder.epoch,
            },
            ladder: Some(Arc::clone(ladder)),
        }
    }

    pub(crate) fn direct(ptr: NonNull<u8>, size: usize, layout: Layout) -> Self {
        Self {
            ptr,
            size,
            origin: BlockOrigin::Direct { layout },
            ladder: None,
        }
    }

    /// Slabs backing a pooled block
    pub(crate) fn ladder(&self) -> Option<&Arc<Ladder>> {
        self.ladder.as_ref()
    }

    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Requested size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Usable bytes: the class size for pooled blocks
    pub fn capacity(&self) -> usize {
        match self.origin {
            BlockOrigin::Pooled { class, .. } => SIZE_CLASSES[class],
            BlockOrigin::Direct { layout } => layout.size(),
        }
    }

    #[inline]
    pub fn origin(&self) -> BlockOrigin {
        self.origin
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.origin, BlockOrigin::Pooled { .. })
    }

    pub fn size_class(&self) -> Option<usize> {
        match self.origin {
            BlockOrigin::Pooled { class, .. } => Some(class),
            BlockOrigin::Direct { .. } => None,
        }
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Copy `src` into the block at `offset`.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .ok_or(Error::InvalidSize(src.len()))?;
        if end > self.size {
            return Err(Error::InvalidSize(end));
        }
        // SAFETY: bounds checked against the requested size above.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
        Ok(())
    }

    /// View the first `size()` bytes.
    ///
    /// # Safety
    ///
    /// Every byte in that range must have been initialized.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.size)
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("origin", &self.origin)
            .finish()
    }
}

/// NUL-terminated string copy living in pool memory
#[derive(Debug)]
#[must_use = "dropping a PooledStr leaks it; return it with MemoryPool::free_str"]
pub struct PooledStr {
    block: Allocation,
    len: usize,
}

impl PooledStr {
    pub(crate) fn new(block: Allocation, len: usize) -> Self {
        debug_assert!(len < block.size());
        Self { block, len }
    }

    /// String bytes without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the first `len` bytes were copied in by the constructor.
        unsafe { std::slice::from_raw_parts(self.block.as_ptr().as_ptr(), self.len) }
    }

    pub fn as_bytes_with_nul(&self) -> &[u8] {
        // SAFETY: `len` bytes plus the terminator were written.
        unsafe { std::slice::from_raw_parts(self.block.as_ptr().as_ptr(), self.len + 1) }
    }

    pub fn to_str(&self) -> std::result::Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_allocation(self) -> Allocation {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_is_bounds_checked() {
        let mut backing = [0u8; 16];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let layout = Layout::from_size_align(16, 1).unwrap();
        let mut block = Allocation::direct(ptr, 8, layout);

        block.write(0, b"abcd").unwrap();
        block.write(4, b"efgh").unwrap();
        assert!(matches!(block.write(5, b"xyzw"), Err(Error::InvalidSize(9))));
        assert_eq!(unsafe { block.as_slice() }, b"abcdefgh");
        assert_eq!(block.capacity(), 16);
        assert!(!block.is_pooled());
    }
}

//! Growable vector and owned string backed by pool memory.

use super::{Allocation, MemoryPool, PooledStr, BLOCK_ALIGN};
use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::slice;

const MIN_VEC_CAPACITY: usize = 4;

/// Vector whose buffer lives in pool memory and grows through
/// [`MemoryPool::realloc`]
pub struct PooledVec<'p, T> {
    pool: &'p MemoryPool,
    block: Option<Allocation>,
    len: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for PooledVec<'_, T> {}
unsafe impl<T: Sync> Sync for PooledVec<'_, T> {}

impl<'p, T> PooledVec<'p, T> {
    /// Empty vector; nothing is allocated until the first push.
    pub fn new(pool: &'p MemoryPool) -> Result<Self> {
        if mem::align_of::<T>() > BLOCK_ALIGN {
            return Err(Error::Alignment {
                requested: mem::align_of::<T>(),
                supported: BLOCK_ALIGN,
            });
        }
        if mem::size_of::<T>() == 0 {
            return Err(Error::InvalidSize(0));
        }
        Ok(Self {
            pool,
            block: None,
            len: 0,
            capacity: 0,
            _marker: PhantomData,
        })
    }

    pub fn with_capacity(pool: &'p MemoryPool, capacity: usize) -> Result<Self> {
        let mut vec = Self::new(pool)?;
        if capacity > 0 {
            vec.resize_buffer(capacity)?;
        }
        Ok(vec)
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        if self.len == self.capacity {
            let target = self
                .capacity
                .checked_mul(2)
                .ok_or(Error::InvalidSize(usize::MAX))?
                .max(MIN_VEC_CAPACITY);
            self.resize_buffer(target)?;
        }
        // SAFETY: len < capacity, and the buffer holds `capacity` slots.
        unsafe { self.as_mut_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot `len` was initialized and is now outside the live range.
        Some(unsafe { self.as_mut_ptr().add(self.len).read() })
    }

    /// Drop every element, keeping the buffer.
    pub fn clear(&mut self) {
        let live: *mut [T] = self.as_mut_slice();
        self.len = 0;
        // SAFETY: the elements were live and `len` no longer covers them.
        unsafe { std::ptr::drop_in_place(live) };
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the buffer currently sits in a pool size class
    pub fn is_pooled(&self) -> bool {
        self.block.as_ref().is_some_and(Allocation::is_pooled)
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.block {
            // SAFETY: the first `len` slots are initialized.
            Some(block) => unsafe {
                slice::from_raw_parts(block.as_ptr().cast::<T>().as_ptr(), self.len)
            },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        match &mut self.block {
            // SAFETY: the first `len` slots are initialized; `&mut self` is unique.
            Some(block) => unsafe {
                slice::from_raw_parts_mut(block.as_mut_ptr().cast::<T>(), len)
            },
            None => &mut [],
        }
    }

    fn as_mut_ptr(&mut self) -> *mut T {
        match &mut self.block {
            Some(block) => block.as_mut_ptr().cast::<T>(),
            None => std::ptr::NonNull::dangling().as_ptr(),
        }
    }

    fn resize_buffer(&mut self, capacity: usize) -> Result<()> {
        let bytes = capacity
            .checked_mul(mem::size_of::<T>())
            .ok_or(Error::InvalidSize(capacity))?;
        if let Some(block) = self.block.as_mut() {
            self.pool.realloc(block, bytes)?;
        } else {
            self.block = Some(self.pool.alloc(bytes).ok_or(Error::Memory)?);
        }
        self.capacity = capacity;
        Ok(())
    }
}

impl<T> Deref for PooledVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for PooledVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> Drop for PooledVec<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if let Some(block) = self.block.take() {
            self.pool.free(block);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Owned UTF-8 string in pool memory, returned to the pool on drop
pub struct PooledString<'p> {
    pool: &'p MemoryPool,
    inner: Option<PooledStr>,
}

impl<'p> PooledString<'p> {
    pub fn new(pool: &'p MemoryPool, s: &str) -> Result<Self> {
        let inner = pool.strdup(s).ok_or(Error::Memory)?;
        Ok(Self {
            pool,
            inner: Some(inner),
        })
    }

    pub fn as_str(&self) -> &str {
        match &self.inner {
            // SAFETY: the bytes were copied verbatim from a `&str`.
            Some(inner) => unsafe { std::str::from_utf8_unchecked(inner.as_bytes()) },
            None => "",
        }
    }

    /// String bytes followed by a NUL terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        self.inner.as_ref().map_or(&b"\0"[..], PooledStr::as_bytes_with_nul)
    }

    /// Release ownership without freeing.
    pub fn into_pooled_str(mut self) -> Option<PooledStr> {
        self.inner.take()
    }
}

impl Deref for PooledString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for PooledString<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for PooledString<'_> {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Drop for PooledString<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.pool.free_str(inner);
        }
    }
}

impl fmt::Debug for PooledString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for PooledString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for PooledString<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for PooledString<'_> {}

impl PartialEq<str> for PooledString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for PooledString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Hash for PooledString<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for PooledString<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PooledString<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

use super::{Allocation, MemoryPool, BLOCK_ALIGN};
use crate::error::{Error, Result};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Owned value stored in pool memory, returned to the pool on drop
pub struct PooledBox<'p, T> {
    ptr: NonNull<T>,
    block: Option<Allocation>,
    pool: &'p MemoryPool,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for PooledBox<'_, T> {}
unsafe impl<T: Sync> Sync for PooledBox<'_, T> {}

impl<'p, T> PooledBox<'p, T> {
    pub fn new(pool: &'p MemoryPool, value: T) -> Result<Self> {
        if mem::align_of::<T>() > BLOCK_ALIGN {
            return Err(Error::Alignment {
                requested: mem::align_of::<T>(),
                supported: BLOCK_ALIGN,
            });
        }
        if mem::size_of::<T>() == 0 {
            return Err(Error::InvalidSize(0));
        }

        let block = pool.alloc(mem::size_of::<T>()).ok_or(Error::Memory)?;
        let ptr = block.as_ptr().cast::<T>();
        // SAFETY: the block is large enough and BLOCK_ALIGN-aligned.
        unsafe { ptr.as_ptr().write(value) };

        Ok(Self {
            ptr,
            block: Some(block),
            pool,
            _marker: PhantomData,
        })
    }

    /// Move the value out and release the storage.
    pub fn into_inner(mut self) -> T {
        // SAFETY: the value is initialized and read exactly once; the block
        // is taken so Drop does not touch it again.
        let value = unsafe { self.ptr.as_ptr().read() };
        if let Some(block) = self.block.take() {
            self.pool.free(block);
        }
        mem::forget(self);
        value
    }

    pub fn is_pooled(&self) -> bool {
        self.block.as_ref().is_some_and(Allocation::is_pooled)
    }
}

impl<T> Deref for PooledBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialized in `new`, valid until drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for PooledBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: unique access through `&mut self`.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for PooledBox<'_, T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: the value is still live because `into_inner` forgets self.
            unsafe { self.ptr.as_ptr().drop_in_place() };
            self.pool.free(block);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledBox").field(&**self).finish()
    }
}

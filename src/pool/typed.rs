//! Single-size object pools outside the size-class ladder.
//!
//! Each pool owns one dedicated [`SlabAllocator`] and keeps no statistics.

use crate::error::{Error, Result};
use crate::slab::{SlabAllocator, SlabStats, OBJECT_ALIGN};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use tracing::warn;

/// Untyped pool of fixed-size objects
#[derive(Debug)]
pub struct ObjectPool {
    slab: SlabAllocator,
}

impl ObjectPool {
    /// `initial_count` objects are carved from each slab.
    pub fn new(object_size: usize, initial_count: usize) -> Result<Self> {
        Ok(Self {
            slab: SlabAllocator::new(object_size, initial_count)?,
        })
    }

    pub fn get_object(&self) -> Result<NonNull<u8>> {
        self.slab.alloc()
    }

    pub fn return_object(&self, object: NonNull<u8>) -> Result<()> {
        self.slab.free(object)
    }

    pub fn object_size(&self) -> usize {
        self.slab.object_size()
    }

    pub fn stats(&self) -> SlabStats {
        self.slab.stats()
    }
}

/// Pool of `T` values handed out behind RAII guards
pub struct TypedPool<T> {
    raw: ObjectPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedPool<T> {
    pub fn new(objects_per_slab: usize) -> Result<Self> {
        if mem::align_of::<T>() > OBJECT_ALIGN {
            return Err(Error::Alignment {
                requested: mem::align_of::<T>(),
                supported: OBJECT_ALIGN,
            });
        }
        Ok(Self {
            raw: ObjectPool::new(mem::size_of::<T>(), objects_per_slab)?,
            _marker: PhantomData,
        })
    }

    pub fn alloc(&self, value: T) -> Result<PoolGuard<'_, T>> {
        let ptr = self.raw.get_object()?.cast::<T>();
        // SAFETY: slots are at least size_of::<T>() bytes and OBJECT_ALIGN-aligned.
        unsafe { ptr.as_ptr().write(value) };
        Ok(PoolGuard { ptr, pool: self })
    }

    pub fn live_objects(&self) -> usize {
        self.raw.stats().live_objects
    }

    pub fn stats(&self) -> SlabStats {
        self.raw.stats()
    }

    fn release(&self, ptr: NonNull<T>) {
        if let Err(err) = self.raw.return_object(ptr.cast()) {
            warn!(%err, "Typed pool rejected returned object");
        }
    }
}

impl<T> std::fmt::Debug for TypedPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedPool")
            .field("type", &std::any::type_name::<T>())
            .field("raw", &self.raw)
            .finish()
    }
}

/// RAII guard for a pooled `T`
pub struct PoolGuard<'a, T> {
    ptr: NonNull<T>,
    pool: &'a TypedPool<T>,
}

unsafe impl<T: Send> Send for PoolGuard<'_, T> {}
unsafe impl<T: Sync> Sync for PoolGuard<'_, T> {}

impl<T> PoolGuard<'_, T> {
    /// Move the value out and return the slot
    pub fn take(self) -> T {
        // SAFETY: read once; Drop is skipped below.
        let value = unsafe { self.ptr.as_ptr().read() };
        self.pool.release(self.ptr);
        mem::forget(self);
        value
    }
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the value is live until the guard goes away.
        unsafe { self.ptr.as_ptr().drop_in_place() };
        self.pool.release(self.ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Session {
        id: u64,
        name: String,
    }

    #[test]
    fn test_object_pool_get_and_return() {
        let pool = ObjectPool::new(24, 4).unwrap();
        assert_eq!(pool.object_size(), 24);

        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        assert_ne!(a, b);
        pool.return_object(a).unwrap();
        assert!(matches!(pool.return_object(a), Err(Error::DoubleFree { .. })));
        pool.return_object(b).unwrap();
        assert_eq!(pool.stats().live_objects, 0);
    }

    #[test]
    fn test_typed_pool_guard_lifecycle() {
        let pool = TypedPool::<Session>::new(8).unwrap();
        {
            let mut session = pool
                .alloc(Session {
                    id: 1,
                    name: "alpha".to_string(),
                })
                .unwrap();
            session.id = 2;
            assert_eq!(session.name, "alpha");
            assert_eq!(pool.live_objects(), 1);
        }
        assert_eq!(pool.live_objects(), 0);

        let guard = pool.alloc(Session::default()).unwrap();
        let session = guard.take();
        assert_eq!(session, Session::default());
        assert_eq!(pool.live_objects(), 0);
    }

    #[test]
    fn test_typed_pool_grows_past_one_slab() {
        let pool = TypedPool::<u64>::new(2).unwrap();
        let guards: Vec<_> = (0..5).map(|i| pool.alloc(i).unwrap()).collect();
        assert_eq!(pool.stats().slab_allocations, 3);
        assert_eq!(guards.iter().map(|g| **g).sum::<u64>(), 10);
    }

    #[test]
    fn test_typed_pool_rejects_bad_types() {
        #[repr(align(16))]
        struct Aligned(#[allow(dead_code)] u8);

        assert!(matches!(
            TypedPool::<Aligned>::new(4),
            Err(Error::Alignment { requested: 16, supported: 8 })
        ));
        assert!(matches!(TypedPool::<()>::new(4), Err(Error::InvalidSize(0))));
        assert!(ObjectPool::new(16, 0).is_err());
    }
}

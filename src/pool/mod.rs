//! Size-class memory pool.
//!
//! A ladder of [`SlabAllocator`]s (16 B to 8 KiB) with per-thread caches in
//! front. Requests above the ladder, and every request made while the pool
//! is not initialised, go to the platform allocator. Each allocation carries
//! its origin, so `free` routes it without trusting a caller-supplied size.
//!
//! Pooled allocations keep their slabs alive, so shutting the pool down
//! with allocations outstanding is safe: each block stays usable and is
//! released to its retired slabs when freed. Such a free is detected by its
//! epoch and left out of the statistics.

mod allocation;
mod boxed;
mod collections;
mod size_class;
mod thread_cache;
mod typed;

pub use allocation::{Allocation, BlockOrigin, PooledStr};
pub use boxed::PooledBox;
pub use collections::{PooledString, PooledVec};
pub use size_class::{
    objects_per_slab, size_class_for, MAX_OBJECTS_PER_SLAB, MAX_POOLED_SIZE,
    MIN_OBJECTS_PER_SLAB, NUM_SIZE_CLASSES, SIZE_CLASSES,
};
pub use thread_cache::THREAD_CACHE_DEPTH;
pub use typed::{ObjectPool, PoolGuard, TypedPool};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::slab::{SlabAllocator, SlabStats};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Alignment of every block the pool hands out
pub const BLOCK_ALIGN: usize = 16;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Pool-wide allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub allocations: u64,
    pub deallocations: u64,
    /// Bytes by capacity: class size for pooled blocks, requested size otherwise
    pub bytes_allocated: u64,
    pub bytes_freed: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    /// Pooled blocks handed out and not yet returned
    pub active_objects: u64,
}

impl MemoryStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.pool_hits.saturating_add(self.pool_misses);
        if total == 0 {
            0.0
        } else {
            self.pool_hits as f64 / total as f64
        }
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.bytes_allocated.saturating_sub(self.bytes_freed)
    }
}

/// One slab allocator per size class, tagged with the init that built it
pub(crate) struct Ladder {
    epoch: u64,
    classes: Vec<SlabAllocator>,
}

impl Ladder {
    fn build(config: &PoolConfig) -> Result<Self> {
        let classes = SIZE_CLASSES
            .iter()
            .map(|&class_size| {
                SlabAllocator::new(
                    class_size,
                    objects_per_slab(config.initial_pool_size, class_size),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            classes,
        })
    }
}

struct PoolState {
    ladder: Arc<Ladder>,
    config: PoolConfig,
}

/// Size-class memory pool.
///
/// An explicit context object: create one per process (or per subsystem)
/// and share it by reference.
pub struct MemoryPool {
    state: RwLock<Option<PoolState>>,
    stats: Mutex<MemoryStats>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    /// Uninitialised pool; every allocation goes to the platform allocator
    /// until [`init`](Self::init) is called.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            stats: Mutex::new(MemoryStats::default()),
        }
    }

    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let pool = Self::new();
        pool.init(Some(config))?;
        Ok(pool)
    }

    /// Build the size-class ladder. A no-op when already initialised.
    pub fn init(&self, config: Option<PoolConfig>) -> Result<()> {
        let mut state = self.state.write();
        if state.is_some() {
            debug!("Memory pool already initialized");
            return Ok(());
        }

        let config = config.unwrap_or_default();
        config.validate()?;
        let ladder = Ladder::build(&config)?;

        if config.thread_cache_size != THREAD_CACHE_DEPTH {
            debug!(
                requested = config.thread_cache_size,
                effective = THREAD_CACHE_DEPTH,
                "Thread cache depth is fixed"
            );
        }

        *self.stats.lock() = MemoryStats::default();
        info!(
            epoch = ladder.epoch,
            classes = NUM_SIZE_CLASSES,
            initial_pool_size = config.initial_pool_size,
            "Memory pool initialized"
        );
        *state = Some(PoolState {
            ladder: Arc::new(ladder),
            config,
        });
        Ok(())
    }

    /// Retire the size-class ladder.
    ///
    /// The slabs are released once the last outstanding pooled allocation
    /// is freed or dropped. Later allocations go to the platform allocator.
    pub fn shutdown(&self) {
        let Some(state) = self.state.write().take() else {
            return;
        };
        let stats = *self.stats.lock();
        info!(
            epoch = state.ladder.epoch,
            allocations = stats.allocations,
            deallocations = stats.deallocations,
            active_objects = stats.active_objects,
            "Memory pool shut down"
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn config(&self) -> Option<PoolConfig> {
        self.state.read().as_ref().map(|s| s.config.clone())
    }

    /// Allocate `size` bytes, aligned to [`BLOCK_ALIGN`].
    ///
    /// Returns `None` for a zero size or when the platform allocator fails.
    pub fn alloc(&self, size: usize) -> Option<Allocation> {
        if size == 0 {
            return None;
        }

        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return alloc_direct(size);
        };
        let record = state.config.enable_statistics;

        let Some(class) = size_class_for(size) else {
            let block = alloc_direct(size)?;
            if record {
                self.record_miss(size);
            }
            return Some(block);
        };

        let ladder = &state.ladder;
        let class_size = SIZE_CLASSES[class] as u64;
        let pooled = thread_cache::pop(ladder, class)
            .map(Ok)
            .unwrap_or_else(|| ladder.classes[class].alloc());

        match pooled {
            Ok(ptr) => {
                if record {
                    self.record(|s| {
                        s.allocations = s.allocations.saturating_add(1);
                        s.bytes_allocated = s.bytes_allocated.saturating_add(class_size);
                        s.pool_hits = s.pool_hits.saturating_add(1);
                        s.active_objects = s.active_objects.saturating_add(1);
                    });
                }
                Some(Allocation::pooled(ptr, size, class, ladder))
            }
            Err(err) => {
                debug!(%err, class_size, "Slab allocation failed, using platform allocator");
                let block = alloc_direct(size)?;
                if record {
                    self.record_miss(size);
                }
                Some(block)
            }
        }
    }

    /// Allocate `count * size` zeroed bytes.
    pub fn calloc(&self, count: usize, size: usize) -> Option<Allocation> {
        let total = count.checked_mul(size)?;
        let mut block = self.alloc(total)?;
        // SAFETY: the block holds at least `total` bytes.
        unsafe { ptr::write_bytes(block.as_mut_ptr(), 0, total) };
        Some(block)
    }

    /// Resize `block` in place when the new size stays in its class,
    /// otherwise move it to a new block and free the old one.
    ///
    /// On error `block` is left untouched.
    pub fn realloc(&self, block: &mut Allocation, new_size: usize) -> Result<()> {
        if new_size == 0 {
            return Err(Error::InvalidSize(0));
        }
        if let BlockOrigin::Pooled { class, .. } = block.origin() {
            if size_class_for(new_size) == Some(class) {
                block.set_size(new_size);
                return Ok(());
            }
        }

        let mut replacement = self.alloc(new_size).ok_or(Error::Memory)?;
        let preserved = block.size().min(new_size);
        // SAFETY: both blocks hold at least `preserved` bytes and are distinct.
        unsafe {
            ptr::copy_nonoverlapping(block.as_ptr().as_ptr(), replacement.as_mut_ptr(), preserved);
        }
        let old = std::mem::replace(block, replacement);
        self.free(old);
        Ok(())
    }

    /// Return a block to wherever it came from.
    pub fn free(&self, block: Allocation) {
        let guard = self.state.read();
        let state = guard.as_ref();

        match block.origin() {
            BlockOrigin::Direct { layout } => {
                if state.is_some_and(|s| s.config.enable_statistics) {
                    let size = block.size() as u64;
                    self.record(|s| {
                        s.deallocations = s.deallocations.saturating_add(1);
                        s.bytes_freed = s.bytes_freed.saturating_add(size);
                    });
                }
                // SAFETY: direct blocks were allocated with exactly this layout.
                unsafe { alloc::dealloc(block.as_ptr().as_ptr(), layout) };
            }
            BlockOrigin::Pooled { class, epoch } => {
                let ptr = block.as_ptr();
                let Some(state) = state.filter(|s| s.ladder.epoch == epoch) else {
                    match block.ladder() {
                        Some(retired) => {
                            warn!(epoch, class, "Returning block to a retired pool");
                            if let Err(err) = retired.classes[class].free(ptr) {
                                warn!(%err, class, "Retired slab rejected freed block");
                            }
                        }
                        None => warn!(epoch, class, "Pooled block without slabs"),
                    }
                    return;
                };
                let ladder = &state.ladder;
                if !thread_cache::push(ladder, class, ptr) {
                    if let Err(err) = ladder.classes[class].free(ptr) {
                        warn!(%err, class, "Slab rejected freed block");
                    }
                }
                if state.config.enable_statistics {
                    let class_size = SIZE_CLASSES[class] as u64;
                    self.record(|s| {
                        s.deallocations = s.deallocations.saturating_add(1);
                        s.bytes_freed = s.bytes_freed.saturating_add(class_size);
                        s.active_objects = s.active_objects.saturating_sub(1);
                    });
                }
            }
        }
    }

    /// Copy `s` into pool memory with a trailing NUL.
    pub fn strdup(&self, s: &str) -> Option<PooledStr> {
        self.copy_str(s.as_bytes())
    }

    /// Copy at most `n` bytes of `s`, stopping early at a NUL, and append a
    /// NUL.
    pub fn strndup(&self, s: &[u8], n: usize) -> Option<PooledStr> {
        let limit = n.min(s.len());
        let len = s[..limit].iter().position(|&b| b == 0).unwrap_or(limit);
        self.copy_str(&s[..len])
    }

    pub fn free_str(&self, s: PooledStr) {
        self.free(s.into_allocation());
    }

    fn copy_str(&self, bytes: &[u8]) -> Option<PooledStr> {
        let mut block = self.alloc(bytes.len().checked_add(1)?)?;
        let dst = block.as_mut_ptr();
        // SAFETY: the block holds `bytes.len() + 1` bytes.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            dst.add(bytes.len()).write(0);
        }
        Some(PooledStr::new(block, bytes.len()))
    }

    pub fn stats(&self) -> MemoryStats {
        *self.stats.lock()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = MemoryStats::default();
    }

    /// Hand the calling thread's cached blocks back to the slabs.
    pub fn clear_thread_cache(&self) -> usize {
        match self.state.read().as_ref() {
            Some(state) => thread_cache::drain(&state.ladder),
            None => 0,
        }
    }

    /// Blocks the calling thread currently caches for this pool
    pub fn thread_cached_blocks(&self) -> usize {
        match self.state.read().as_ref() {
            Some(state) => thread_cache::cached_blocks(&state.ladder),
            None => 0,
        }
    }

    /// Per-class slab statistics, smallest class first
    pub fn slab_stats(&self) -> Vec<SlabStats> {
        match self.state.read().as_ref() {
            Some(state) => state.ladder.classes.iter().map(|c| c.stats()).collect(),
            None => Vec::new(),
        }
    }

    pub fn check_invariants(&self) -> Result<()> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;
        for slab in &state.ladder.classes {
            slab.check_invariants()?;
        }
        Ok(())
    }

    #[inline]
    fn record(&self, update: impl FnOnce(&mut MemoryStats)) {
        update(&mut self.stats.lock());
    }

    /// Count a platform-allocator block by its requested size, the same
    /// amount `free` credits back.
    fn record_miss(&self, size: usize) {
        self.record(|s| {
            s.allocations = s.allocations.saturating_add(1);
            s.bytes_allocated = s.bytes_allocated.saturating_add(size as u64);
            s.pool_misses = s.pool_misses.saturating_add(1);
        });
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryPool")
            .field("initialized", &state.is_some())
            .field("epoch", &state.as_ref().map(|s| s.ladder.epoch))
            .field("stats", &*self.stats.lock())
            .finish()
    }
}

fn alloc_direct(size: usize) -> Option<Allocation> {
    let layout = Layout::from_size_align(size, BLOCK_ALIGN).ok()?;
    // SAFETY: `size` is non-zero.
    let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;
    Some(Allocation::direct(ptr, size, layout))
}

//! Per-thread caches of recently freed pool blocks.
//!
//! Each thread keeps one cache per live pool initialisation, keyed by the
//! pool epoch. A cache holds a weak reference to its ladder: once the ladder
//! is released the cache is simply discarded, and a thread exiting while the
//! ladder is alive hands its blocks back to the slabs.

use super::size_class::NUM_SIZE_CLASSES;
use super::Ladder;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

/// Blocks each thread keeps per size class
pub const THREAD_CACHE_DEPTH: usize = 8;

type Bin = SmallVec<[NonNull<u8>; THREAD_CACHE_DEPTH]>;

struct ThreadCache {
    epoch: u64,
    ladder: Weak<Ladder>,
    bins: [Bin; NUM_SIZE_CLASSES],
}

impl ThreadCache {
    fn new(ladder: &Arc<Ladder>) -> Self {
        Self {
            epoch: ladder.epoch,
            ladder: Arc::downgrade(ladder),
            bins: std::array::from_fn(|_| Bin::new()),
        }
    }

    fn is_live(&self) -> bool {
        self.ladder.strong_count() > 0
    }

    fn drain_into(&mut self, ladder: &Ladder) -> usize {
        let mut returned = 0;
        for (class, bin) in self.bins.iter_mut().enumerate() {
            for ptr in bin.drain(..) {
                // Every cached block came out of this ladder's slab.
                if ladder.classes[class].free(ptr).is_ok() {
                    returned += 1;
                }
            }
        }
        returned
    }

    fn len(&self) -> usize {
        self.bins.iter().map(|bin| bin.len()).sum()
    }
}

impl Drop for ThreadCache {
    fn drop(&mut self) {
        if let Some(ladder) = self.ladder.upgrade() {
            self.drain_into(&ladder);
        }
    }
}

thread_local! {
    static THREAD_CACHES: RefCell<Vec<ThreadCache>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` on this thread's cache for `ladder`, creating it on first use.
///
/// Returns `None` while the thread is tearing down its locals.
fn with_cache<R>(ladder: &Arc<Ladder>, f: impl FnOnce(&mut ThreadCache) -> R) -> Option<R> {
    THREAD_CACHES
        .try_with(|caches| {
            let mut caches = caches.try_borrow_mut().ok()?;
            let idx = match caches.iter().position(|c| c.epoch == ladder.epoch) {
                Some(idx) => idx,
                None => {
                    caches.retain(ThreadCache::is_live);
                    caches.push(ThreadCache::new(ladder));
                    caches.len() - 1
                }
            };
            Some(f(&mut caches[idx]))
        })
        .ok()
        .flatten()
}

pub(crate) fn pop(ladder: &Arc<Ladder>, class: usize) -> Option<NonNull<u8>> {
    with_cache(ladder, |cache| cache.bins[class].pop()).flatten()
}

/// Cache a freed block; `false` when the bin is already full.
pub(crate) fn push(ladder: &Arc<Ladder>, class: usize, ptr: NonNull<u8>) -> bool {
    with_cache(ladder, |cache| {
        let bin = &mut cache.bins[class];
        if bin.len() < THREAD_CACHE_DEPTH {
            bin.push(ptr);
            true
        } else {
            false
        }
    })
    .unwrap_or(false)
}

/// Return every block this thread caches for `ladder` to the slabs.
pub(crate) fn drain(ladder: &Arc<Ladder>) -> usize {
    with_cache(ladder, |cache| cache.drain_into(ladder)).unwrap_or(0)
}

pub(crate) fn cached_blocks(ladder: &Arc<Ladder>) -> usize {
    with_cache(ladder, |cache| cache.len()).unwrap_or(0)
}

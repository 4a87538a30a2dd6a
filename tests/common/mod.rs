#![allow(dead_code)]

pub mod concurrent;

use lightning_hotpath::logging::init_logging;
use lightning_hotpath::{MemoryPool, PoolConfig};
use std::sync::Arc;
use tracing::Level;

pub fn init_test_logging() {
    let _ = init_logging(Level::WARN, false);
}

/// Initialized pool with small slabs so tests cross slab boundaries quickly
pub fn test_pool() -> Arc<MemoryPool> {
    let config = PoolConfig {
        initial_pool_size: 4096,
        ..Default::default()
    };
    Arc::new(MemoryPool::with_config(config).unwrap())
}

/// Byte pattern unique to a thread and iteration
pub fn pattern(thread_id: usize, i: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|j| (thread_id * 31 + i * 7 + j) as u8)
        .collect()
}

//! Configuration for the memory pool and per-worker request contexts.
//!
//! Both structs are plain serde types so they can be embedded in whatever
//! configuration document the surrounding server loads.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default arena size for a worker, large enough for one parsed request
/// plus scratch space.
pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024;

/// Memory pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Bytes per size class used to derive objects per slab
    pub initial_pool_size: usize,
    /// Ceiling before falling back to the platform allocator.
    ///
    /// Accepted and validated, but the allocation path does not enforce it.
    pub max_pool_size: usize,
    /// Requested per-class thread cache depth.
    ///
    /// Accepted and validated; the effective depth is always
    /// [`THREAD_CACHE_DEPTH`](crate::pool::THREAD_CACHE_DEPTH).
    pub thread_cache_size: usize,
    /// Track allocation statistics. Does not change allocation behavior.
    pub enable_statistics: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_pool_size: 1024 * 1024,    // 1MB
            max_pool_size: 16 * 1024 * 1024,   // 16MB
            thread_cache_size: 8,
            enable_statistics: true,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_pool_size == 0 {
            return Err(Error::Config(
                "initial_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.max_pool_size < self.initial_pool_size {
            return Err(Error::Config(format!(
                "max_pool_size ({}) is smaller than initial_pool_size ({})",
                self.max_pool_size, self.initial_pool_size
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Size of the request arena in bytes
    pub arena_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        let minimum = crate::parser::request_footprint();
        if self.arena_size < minimum {
            return Err(Error::Config(format!(
                "arena_size ({}) cannot hold a parsed request ({} bytes)",
                self.arena_size, minimum
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

//! Request hot path for a key-value server: a bump [`Arena`] for per-request
//! scratch memory, a size-class [`MemoryPool`] built on [`SlabAllocator`]s,
//! and a zero-copy command parser that writes its output into an arena.

pub mod arena;
pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod pool;
pub mod slab;
pub mod worker;

pub use arena::{Arena, ARENA_ALIGN};
pub use config::{PoolConfig, WorkerConfig, DEFAULT_ARENA_SIZE};
pub use error::{Error, Result};
pub use parser::{
    get_command_name, get_command_type, parse, validate_request, CommandType, Numeric,
    ParseError, ParsedRequest,
};
pub use pool::{
    Allocation, BlockOrigin, MemoryPool, MemoryStats, ObjectPool, PoolGuard, PooledBox,
    PooledStr, PooledString, PooledVec, TypedPool,
};
pub use slab::{SlabAllocator, SlabStats};
pub use worker::{install_worker_context, take_worker_context, with_worker_context, WorkerContext};

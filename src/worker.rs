//! Per-worker parse context.
//!
//! A [`WorkerContext`] owns the arena a worker thread parses requests into.
//! Each thread may register one context in a thread-local slot so deeply
//! nested code can reach it without threading it through every call.

use crate::arena::Arena;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::parser::{self, ParsedRequest};
use std::cell::RefCell;
use tracing::debug;

pub struct WorkerContext {
    arena: Arena,
    requests_parsed: u64,
    requests_rejected: u64,
}

impl WorkerContext {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        config.validate()?;
        let arena = Arena::new(config.arena_size)?;
        debug!(arena_size = config.arena_size, "Worker context created");
        Ok(Self {
            arena,
            requests_parsed: 0,
            requests_rejected: 0,
        })
    }

    /// Reset the arena and parse `input` into it.
    ///
    /// The previous request is gone once this is called again.
    pub fn parse<'a, 'buf: 'a>(&'a mut self, input: &'buf [u8]) -> Option<&'a ParsedRequest<'buf>> {
        self.arena.reset();
        let request = parser::parse(input, &self.arena).map(|r| &*r);
        if request.is_some_and(ParsedRequest::is_valid) {
            self.requests_parsed += 1;
        } else {
            self.requests_rejected += 1;
        }
        request
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn requests_parsed(&self) -> u64 {
        self.requests_parsed
    }

    /// Empty, malformed and unknown requests
    pub fn requests_rejected(&self) -> u64 {
        self.requests_rejected
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("arena", &self.arena)
            .field("requests_parsed", &self.requests_parsed)
            .field("requests_rejected", &self.requests_rejected)
            .finish()
    }
}

thread_local! {
    static WORKER_CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Register `context` for the calling thread, returning the one it replaces.
pub fn install_worker_context(context: WorkerContext) -> Option<WorkerContext> {
    WORKER_CONTEXT.with(|slot| slot.borrow_mut().replace(context))
}

/// Unregister and return the calling thread's context.
pub fn take_worker_context() -> Option<WorkerContext> {
    WORKER_CONTEXT.with(|slot| slot.borrow_mut().take())
}

/// Run `f` on the calling thread's context.
///
/// Returns `None` when no context is installed, or when called from inside
/// another `with_worker_context` closure.
pub fn with_worker_context<R>(f: impl FnOnce(&mut WorkerContext) -> R) -> Option<R> {
    WORKER_CONTEXT.with(|slot| {
        let mut slot = slot.try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CommandType, ParseError};

    #[test]
    fn test_parse_counts_outcomes() {
        let mut ctx = WorkerContext::new(&WorkerConfig::default()).unwrap();

        let request = ctx.parse(b"SET key value").unwrap();
        assert_eq!(request.command, CommandType::Set);

        let request = ctx.parse(b"NOPE").unwrap();
        assert_eq!(request.error, Some(ParseError::UnknownCommand));
        assert!(ctx.parse(b"").is_none());

        assert_eq!(ctx.requests_parsed(), 1);
        assert_eq!(ctx.requests_rejected(), 2);
    }

    #[test]
    fn test_parse_resets_arena_each_time() {
        let mut ctx = WorkerContext::new(&WorkerConfig::default()).unwrap();
        for _ in 0..1000 {
            assert!(ctx.parse(b"GET key").is_some());
        }
        assert_eq!(ctx.arena().generation(), 1000);
        assert!(ctx.arena().used() <= parser::request_footprint());
    }

    #[test]
    fn test_registry_install_and_take() {
        assert!(take_worker_context().is_none());
        assert!(with_worker_context(|_| ()).is_none());

        let ctx = WorkerContext::new(&WorkerConfig::default()).unwrap();
        assert!(install_worker_context(ctx).is_none());

        let command = with_worker_context(|ctx| ctx.parse(b"PING").map(|r| r.command));
        assert_eq!(command, Some(Some(CommandType::Ping)));

        let nested = with_worker_context(|_| with_worker_context(|_| ()));
        assert_eq!(nested, Some(None));

        let ctx = take_worker_context().unwrap();
        assert_eq!(ctx.requests_parsed(), 1);
        assert!(take_worker_context().is_none());
    }

    #[test]
    fn test_rejects_undersized_arena() {
        let config = WorkerConfig { arena_size: 128 };
        assert!(WorkerContext::new(&config).is_err());
    }
}

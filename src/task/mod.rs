//! Out-of-band execution of the geometry combine step.
//!
//! Combining is dispatched to a worker pool and the caller polls a handle
//! once per frame. The handle resolves exactly once (success or failure);
//! dropping it before resolution discards the worker's result at the
//! channel, which is what makes destroying a primitive mid-combine safe.

use std::sync::{Arc, OnceLock};

use crossbeam_channel::{bounded, Receiver, TryRecvError};

use crate::combine::{self, CombineInput, CombineOutput};
use crate::error::{EngineError, EngineResult};

/// How dispatched work is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Worker thread pool; `dispatch` returns immediately.
    Threaded,
    /// Run synchronously inside `dispatch`. Deterministic; used by tests and
    /// single-threaded targets. State transitions still require the next
    /// `update` to observe the result.
    Inline,
}

/// Combine work scheduler. One process-wide instance is shared by default;
/// primitives can be constructed with a private one.
pub struct CombineScheduler {
    pool: Option<rayon::ThreadPool>,
}

static GLOBAL: OnceLock<Arc<CombineScheduler>> = OnceLock::new();

impl CombineScheduler {
    pub fn new(mode: SchedulerMode) -> EngineResult<Self> {
        let pool = match mode {
            SchedulerMode::Inline => None,
            SchedulerMode::Threaded => {
                let threads = num_cpus::get().saturating_sub(1).max(1);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("geometry-combine-{}", i))
                    // A panicking combine must not take the process down;
                    // the dropped sender surfaces as a combine failure.
                    .panic_handler(|_| log::error!("geometry combine worker panicked"))
                    .build()
                    .map_err(|e| EngineError::internal(format!("thread pool: {}", e)))?;
                log::info!("combine scheduler started with {} workers", threads);
                Some(pool)
            }
        };
        Ok(Self { pool })
    }

    /// Install the process-wide scheduler. Returns `false` when one is
    /// already installed (including lazily via `global`).
    pub fn init_global(mode: SchedulerMode) -> EngineResult<bool> {
        let scheduler = Arc::new(Self::new(mode)?);
        Ok(GLOBAL.set(scheduler).is_ok())
    }

    /// Process-wide scheduler, lazily threaded when not explicitly
    /// installed. Falls back to inline execution if the pool cannot start.
    pub fn global() -> Arc<CombineScheduler> {
        GLOBAL
            .get_or_init(|| {
                let scheduler = Self::new(SchedulerMode::Threaded)
                    .or_else(|_| Self::new(SchedulerMode::Inline))
                    .unwrap_or(CombineScheduler { pool: None });
                Arc::new(scheduler)
            })
            .clone()
    }

    /// Hand the exclusively owned input to a worker. Never blocks on the
    /// combine itself in threaded mode.
    pub fn dispatch(&self, input: CombineInput) -> CombineHandle {
        let (sender, receiver) = bounded(1);
        match &self.pool {
            Some(pool) => {
                pool.spawn(move || {
                    let result = combine::combine(input);
                    // The receiver may be gone if the primitive was
                    // destroyed; the stale result is simply dropped.
                    let _ = sender.send(result);
                });
            }
            None => {
                let _ = sender.send(combine::combine(input));
            }
        }
        CombineHandle {
            receiver: Some(receiver),
        }
    }
}

/// Pending combine result. Resolves exactly once.
pub struct CombineHandle {
    receiver: Option<Receiver<EngineResult<CombineOutput>>>,
}

impl CombineHandle {
    /// Non-blocking poll. Returns `Some` exactly once when the combine has
    /// resolved; every later call returns `None`. A worker that died without
    /// sending (panic) resolves as a combine failure.
    pub fn try_resolve(&mut self) -> Option<EngineResult<CombineOutput>> {
        let receiver = self.receiver.as_ref()?;
        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                Some(Err(EngineError::combine_failed(
                    "combine worker terminated without producing a result",
                )))
            }
        }
    }
}

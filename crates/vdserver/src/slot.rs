//! Latest-wins background query slots.
//!
//! A [`QuerySlot`] owns at most one observable computation. Every
//! [`run`](QuerySlot::run) starts a new generation, cancels the previous one
//! and hands the job to the worker pool; [`poll`](QuerySlot::poll) only ever
//! reports on the newest generation, so a stale computation that finishes
//! late is invisible to the caller.

use crate::format::{CANCELLED, PENDING};
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};
use vdserver_engine::{CancellationToken, EngineError, EngineResult};

/// What a poll observed.
#[derive(Debug)]
pub enum SlotState<T> {
    /// Nothing started yet, or the latest generation is still running.
    Pending,
    /// The latest generation failed or was cancelled.
    Cancelled,
    /// The latest generation finished with this result.
    Ready(Arc<T>),
}

impl<T> SlotState<T> {
    /// The result, or the sentinel describing why there is none.
    pub fn ready(self) -> Result<Arc<T>, &'static str> {
        match self {
            Self::Pending => Err(PENDING),
            Self::Cancelled => Err(CANCELLED),
            Self::Ready(value) => Ok(value),
        }
    }
}

#[derive(Debug)]
enum Outcome<T> {
    Idle,
    Running,
    Completed(Arc<T>),
    Faulted,
    Cancelled,
}

#[derive(Debug)]
struct Generation<T> {
    id: u64,
    token: CancellationToken,
    outcome: Mutex<Outcome<T>>,
}

impl<T> Generation<T> {
    fn new(id: u64, outcome: Outcome<T>) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            outcome: Mutex::new(outcome),
        }
    }
}

/// One latest-wins query slot.
pub struct QuerySlot<T> {
    name: &'static str,
    pool: Arc<ThreadPool>,
    current: Mutex<Arc<Generation<T>>>,
}

impl<T: Send + Sync + 'static> QuerySlot<T> {
    /// Create an idle slot whose jobs run on `pool`.
    pub fn new(name: &'static str, pool: Arc<ThreadPool>) -> Self {
        Self {
            name,
            pool,
            current: Mutex::new(Arc::new(Generation::new(0, Outcome::Idle))),
        }
    }

    /// Start a new generation running `job` and return its number.
    ///
    /// Never blocks: the previous generation is only signalled, not awaited.
    /// The job must check the token it receives at safe points.
    pub fn run<F>(&self, job: F) -> u64
    where
        F: FnOnce(&CancellationToken) -> EngineResult<T> + Send + 'static,
    {
        let generation = {
            let mut current = self.current.lock();
            let generation = Arc::new(Generation::new(current.id + 1, Outcome::Running));
            let previous = std::mem::replace(&mut *current, Arc::clone(&generation));
            previous.token.cancel();
            generation
        };
        let id = generation.id;
        debug!(slot = self.name, generation = id, "query started");

        let name = self.name;
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| job(&generation.token)));
            let outcome = match result {
                Ok(Ok(_)) if generation.token.is_cancelled() => Outcome::Cancelled,
                Ok(Ok(value)) => Outcome::Completed(Arc::new(value)),
                Ok(Err(EngineError::Cancelled)) => Outcome::Cancelled,
                Ok(Err(err)) => {
                    warn!(slot = name, generation = id, error = %err, "query failed");
                    Outcome::Faulted
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(slot = name, generation = id, %message, "query panicked");
                    Outcome::Faulted
                }
            };
            debug!(slot = name, generation = id, outcome = outcome.label(), "query finished");
            *generation.outcome.lock() = outcome;
        });
        id
    }

    /// Observe the latest generation without blocking.
    ///
    /// Repeated polls of a finished generation return the same `Arc`.
    pub fn poll(&self) -> SlotState<T> {
        let generation = Arc::clone(&self.current.lock());
        let outcome = generation.outcome.lock();
        match &*outcome {
            Outcome::Idle | Outcome::Running => SlotState::Pending,
            Outcome::Faulted | Outcome::Cancelled => SlotState::Cancelled,
            Outcome::Completed(value) => SlotState::Ready(Arc::clone(value)),
        }
    }

    /// Number of the latest generation; `0` before the first run.
    pub fn generation(&self) -> u64 {
        self.current.lock().id
    }

    /// Signal cancellation to the latest generation.
    pub fn cancel(&self) {
        self.current.lock().token.cancel();
    }
}

impl<T> std::fmt::Debug for QuerySlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySlot")
            .field("name", &self.name)
            .field("generation", &self.current.lock().id)
            .finish_non_exhaustive()
    }
}

impl<T> Outcome<T> {
    const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed(_) => "completed",
            Self::Faulted => "faulted",
            Self::Cancelled => "cancelled",
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

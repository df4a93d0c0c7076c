//! Debounce + threshold id batcher
//!
//! State machine per batcher:
//!
//! ```text
//!            enqueue                 size reached / timer fired
//!   Idle ─────────────▶ Accumulating ──────────────────────────▶ Flushing
//!    ▲                      ▲                                        │
//!    │                      └──────── enqueue during flush ──────────┤
//!    └───────────────────────── handler returned (ok or err) ────────┘
//! ```
//!
//! The pending set is swapped out before the handler runs, so ids enqueued
//! while a flush is in flight start a new batch instead of joining it.

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::handler::BatchHandler;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Observable batcher phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// Nothing pending, nothing in flight
    Idle,
    /// Ids are pending; a flush will follow
    Accumulating,
    /// Nothing pending, at least one flush in flight
    Flushing,
}

/// What caused a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Pending set reached `batch_size`
    Size,
    /// Debounce window elapsed
    Timer,
    /// Explicit [`IdBatcher::flush_now`]
    Manual,
}

/// Counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Flushes started
    pub flushes: u64,
    /// Ids handed to the handler across all flushes
    pub ids_flushed: u64,
    /// Handler invocations (a flush may be split into several)
    pub calls: u64,
    /// Handler invocations that returned an error
    pub failed_calls: u64,
}

#[derive(Debug, Default)]
struct Counters {
    flushes: AtomicU64,
    ids_flushed: AtomicU64,
    calls: AtomicU64,
    failed_calls: AtomicU64,
}

#[derive(Debug, Default)]
struct BatchState {
    pending: IndexSet<String>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    in_flight: usize,
}

struct Inner {
    config: BatchConfig,
    handler: Arc<dyn BatchHandler>,
    runtime: Handle,
    state: Mutex<BatchState>,
    counters: Counters,
    idle: Notify,
}

/// Coalesces single-id requests into bounded batch calls
///
/// Cheap to clone; clones share the same pending set.
#[derive(Clone)]
pub struct IdBatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for IdBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdBatcher")
            .field("config", &self.inner.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl IdBatcher {
    /// Create a batcher driven by the current tokio runtime
    ///
    /// # Errors
    /// - [`BatchError::InvalidConfig`] if `config` fails validation
    /// - [`BatchError::NoRuntime`] if called outside a tokio runtime
    pub fn new(config: BatchConfig, handler: Arc<dyn BatchHandler>) -> Result<Self, BatchError> {
        let runtime = Handle::try_current().map_err(|_| BatchError::NoRuntime)?;
        Self::with_runtime(config, handler, runtime)
    }

    /// Create a batcher whose timers run on `runtime`
    ///
    /// # Errors
    /// [`BatchError::InvalidConfig`] if `config` fails validation
    pub fn with_runtime(
        config: BatchConfig,
        handler: Arc<dyn BatchHandler>,
        runtime: Handle,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                handler,
                runtime,
                state: Mutex::new(BatchState::default()),
                counters: Counters::default(),
                idle: Notify::new(),
            }),
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue `id` for the next batch
    ///
    /// Returns `false` when the id was ignored: blank, or already pending in
    /// the current batch. Reaching `batch_size` flushes immediately;
    /// otherwise the debounce timer restarts.
    pub fn enqueue(&self, id: &str) -> bool {
        if id.trim().is_empty() {
            return false;
        }
        let mut state = self.inner.state.lock();
        if !state.pending.insert(id.to_string()) {
            trace!(id, "id already pending");
            return false;
        }
        self.after_insert(state);
        true
    }

    /// Queue many ids at once
    ///
    /// A burst that crosses `batch_size` is flushed as a single batch, split
    /// into calls of at most `max_batch_size` ids. Returns how many ids were
    /// newly queued.
    pub fn enqueue_many<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.inner.state.lock();
        let mut added = 0;
        for id in ids {
            let id = id.as_ref();
            if !id.trim().is_empty() && state.pending.insert(id.to_string()) {
                added += 1;
            }
        }
        if added > 0 {
            self.after_insert(state);
        }
        added
    }

    fn after_insert(&self, mut state: parking_lot::MutexGuard<'_, BatchState>) {
        if state.pending.len() >= self.inner.config.batch_size {
            let ids = take_pending(&mut state);
            drop(state);
            let inner = Arc::clone(&self.inner);
            self.inner
                .runtime
                .spawn(async move { run_flush(&inner, ids, FlushTrigger::Size).await });
        } else {
            arm_timer(&self.inner, &mut state);
        }
    }

    /// Flush whatever is pending and wait for the handler
    pub async fn flush_now(&self) {
        let ids = {
            let mut state = self.inner.state.lock();
            if state.pending.is_empty() {
                return;
            }
            take_pending(&mut state)
        };
        run_flush(&self.inner, ids, FlushTrigger::Manual).await;
    }

    /// Drop all pending ids without flushing them
    ///
    /// Returns the dropped ids. In-flight flushes are unaffected.
    pub fn cancel_pending(&self) -> Vec<String> {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let dropped: Vec<String> = std::mem::take(&mut state.pending).into_iter().collect();
        let idle = state.in_flight == 0;
        drop(state);
        if idle {
            self.inner.idle.notify_waiters();
        }
        if !dropped.is_empty() {
            debug!(ids = dropped.len(), "cancelled pending ids");
        }
        dropped
    }

    /// Whether `id` is waiting in the current batch
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.inner.state.lock().pending.contains(id)
    }

    /// Number of ids waiting in the current batch
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of flushes currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> BatchPhase {
        let state = self.inner.state.lock();
        if !state.pending.is_empty() {
            BatchPhase::Accumulating
        } else if state.in_flight > 0 {
            BatchPhase::Flushing
        } else {
            BatchPhase::Idle
        }
    }

    /// Wait until nothing is pending and nothing is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.phase() == BatchPhase::Idle {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        let c = &self.inner.counters;
        BatchStats {
            flushes: c.flushes.load(Ordering::Relaxed),
            ids_flushed: c.ids_flushed.load(Ordering::Relaxed),
            calls: c.calls.load(Ordering::Relaxed),
            failed_calls: c.failed_calls.load(Ordering::Relaxed),
        }
    }
}

/// Swap the pending set out and move to `Flushing`
fn take_pending(state: &mut BatchState) -> Vec<String> {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.generation = state.generation.wrapping_add(1);
    state.in_flight += 1;
    std::mem::take(&mut state.pending).into_iter().collect()
}

/// (Re)start the debounce timer
fn arm_timer(inner: &Arc<Inner>, state: &mut BatchState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.generation = state.generation.wrapping_add(1);
    let generation = state.generation;
    let debounce = inner.config.debounce();
    let task_inner = Arc::clone(inner);
    state.timer = Some(inner.runtime.spawn(async move {
        tokio::time::sleep(debounce).await;
        fire_timer(&task_inner, generation).await;
    }));
}

async fn fire_timer(inner: &Arc<Inner>, generation: u64) {
    let ids = {
        let mut state = inner.state.lock();
        if state.generation != generation || state.pending.is_empty() {
            return;
        }
        // Detach so a later enqueue cannot abort the flush running on this task.
        state.timer = None;
        take_pending(&mut state)
    };
    run_flush(inner, ids, FlushTrigger::Timer).await;
}

/// Decrements the in-flight count even if the handler panics
struct InFlightGuard<'a> {
    inner: &'a Inner,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let idle = state.in_flight == 0 && state.pending.is_empty();
        drop(state);
        if idle {
            self.inner.idle.notify_waiters();
        }
    }
}

async fn run_flush(inner: &Inner, ids: Vec<String>, trigger: FlushTrigger) {
    let _guard = InFlightGuard { inner };
    let counters = &inner.counters;
    counters.flushes.fetch_add(1, Ordering::Relaxed);
    counters
        .ids_flushed
        .fetch_add(ids.len() as u64, Ordering::Relaxed);
    debug!(ids = ids.len(), ?trigger, "flushing id batch");

    for chunk in ids.chunks(inner.config.max_batch_size) {
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if let Err(error) = inner.handler.on_batch_ready(chunk.to_vec()).await {
            counters.failed_calls.fetch_add(1, Ordering::Relaxed);
            warn!(%error, ids = chunk.len(), "batch handler failed");
        }
    }
}

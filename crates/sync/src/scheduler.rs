//! Cancelable delayed tasks.
//!
//! The persistence gateway coalesces writes by arming a delayed task and
//! cancelling it whenever a newer state arrives. Timers sit behind the
//! [`Scheduler`] trait so coalescing can be driven by a virtual clock in tests
//! ([`ManualScheduler`]) and by tokio timers in production
//! ([`TokioScheduler`]).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::trace;

/// A unit of deferred work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle identifying a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelToken(u64);

/// Runs tasks after a delay, with cancellation.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> CancelToken;

    /// Cancel a task that has not started yet. Unknown or already started
    /// tokens are ignored.
    fn cancel(&self, token: CancelToken);

    /// Whether the task is still waiting for its delay to elapse.
    fn is_pending(&self, token: CancelToken) -> bool;
}

// =============================================================================
// Tokio
// =============================================================================

/// Scheduler backed by `tokio::time::sleep` on spawned tasks.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    inner: Arc<TokioSchedulerInner>,
}

#[derive(Debug, Default)]
struct TokioSchedulerInner {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, AbortHandle>>,
}

impl TokioSchedulerInner {
    fn waiting(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokioScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancelToken {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        // Hold the lock across spawn + insert so the task cannot deregister
        // itself before it has been registered.
        let mut waiting = self.inner.waiting();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Once started the task runs to completion; cancel no longer applies.
            inner.waiting().remove(&id);
            task.await;
        });
        waiting.insert(id, handle.abort_handle());
        drop(waiting);

        CancelToken(id)
    }

    fn cancel(&self, token: CancelToken) {
        if let Some(handle) = self.inner.waiting().remove(&token.0) {
            handle.abort();
            trace!(token = token.0, "Cancelled scheduled task");
        }
    }

    fn is_pending(&self, token: CancelToken) -> bool {
        self.inner.waiting().contains_key(&token.0)
    }
}

// =============================================================================
// Manual clock
// =============================================================================

/// Scheduler driven by an explicit virtual clock.
///
/// Nothing runs until [`ManualScheduler::advance`] moves the clock past a
/// task's deadline; due tasks then run in deadline order on the caller's task.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    queue: Vec<Scheduled>,
}

struct Scheduled {
    id: u64,
    due: Duration,
    task: Task,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current virtual time since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks waiting for their deadline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Move the clock forward and run every task that became due.
    ///
    /// Returns the number of tasks that ran.
    pub async fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let (mut due, waiting): (Vec<Scheduled>, Vec<Scheduled>) =
                state.queue.drain(..).partition(|s| s.due <= now);
            state.queue = waiting;
            due.sort_by_key(|s| (s.due, s.id));
            due
        };

        let ran = due.len();
        for scheduled in due {
            scheduled.task.await;
        }
        ran
    }

    /// Advance far enough to run everything currently scheduled.
    pub async fn run_all(&self) -> usize {
        let remaining = {
            let state = self.lock();
            state
                .queue
                .iter()
                .map(|s| s.due)
                .max()
                .map_or(Duration::ZERO, |latest| latest.saturating_sub(state.now))
        };
        self.advance(remaining).await
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancelToken {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.queue.push(Scheduled { id, due, task });
        CancelToken(id)
    }

    fn cancel(&self, token: CancelToken) {
        self.lock().queue.retain(|s| s.id != token.0);
    }

    fn is_pending(&self, token: CancelToken) -> bool {
        self.lock().queue.iter().any(|s| s.id == token.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_manual_runs_only_when_due() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let token = scheduler.schedule(Duration::from_millis(100), counting_task(&counter));
        assert!(scheduler.is_pending(token));

        assert_eq!(scheduler.advance(Duration::from_millis(99)).await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(scheduler.advance(Duration::from_millis(1)).await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(token));
    }

    #[tokio::test]
    async fn test_manual_cancel() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let token = scheduler.schedule(Duration::from_millis(10), counting_task(&counter));
        scheduler.cancel(token);
        scheduler.cancel(token);

        assert_eq!(scheduler.run_all().await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_manual_run_all() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(Duration::from_millis(10), counting_task(&counter));
        scheduler.schedule(Duration::from_millis(500), counting_task(&counter));

        assert_eq!(scheduler.run_all().await, 2);
        assert_eq!(scheduler.now(), Duration::from_millis(500));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_runs_and_cancels() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let cancelled = scheduler.schedule(Duration::from_millis(20), counting_task(&counter));
        let kept = scheduler.schedule(Duration::from_millis(20), counting_task(&counter));
        assert!(scheduler.is_pending(cancelled));
        scheduler.cancel(cancelled);
        assert!(!scheduler.is_pending(cancelled));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(kept));
    }
}

//! Debounced persistence of local state to the remote store.
//!
//! Quantity tweaks arrive in bursts (a user hammering +/-). The gateway
//! coalesces them with a trailing-edge debounce: each [`schedule`] cancels the
//! pending write and arms a new one, so only the state as of the last call is
//! written once the window passes quietly.
//!
//! A failed write is logged and dropped. The next local change schedules the
//! full state again, which makes the window itself the retry gate.
//!
//! Every armed task counts as in flight from the moment it is armed until it
//! finishes or is cancelled; [`settled`] waits for that count to reach zero.
//!
//! [`schedule`]: PersistenceGateway::schedule
//! [`settled`]: PersistenceGateway::settled

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use atelier_core::{SyncDocument, UserId};

use crate::remote::{RemoteStore, to_document};
use crate::scheduler::{CancelToken, Scheduler, Task};

/// Coalesces writes of one document kind.
pub struct PersistenceGateway<D, R> {
    remote: Arc<R>,
    scheduler: Arc<dyn Scheduler>,
    window: Duration,
    pending: Mutex<Option<CancelToken>>,
    in_flight: Arc<watch::Sender<usize>>,
    _doc: PhantomData<fn() -> D>,
}

/// Counts one armed task until dropped.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl<D: SyncDocument, R: RemoteStore> PersistenceGateway<D, R> {
    #[must_use]
    pub fn new(remote: Arc<R>, scheduler: Arc<dyn Scheduler>, window: Duration) -> Self {
        Self {
            remote,
            scheduler,
            window,
            pending: Mutex::new(None),
            in_flight: Arc::new(watch::Sender::new(0)),
            _doc: PhantomData,
        }
    }

    /// The quiescence window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Schedule a write of `state` to `user`'s document.
    ///
    /// Cancels any write still waiting for its window.
    pub fn schedule(&self, user: &UserId, state: &D) {
        let fields = match to_document(&state.to_envelope(Utc::now())) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(kind = %D::KIND, error = %e, "Failed to encode state for remote write");
                return;
            }
        };

        let remote = Arc::clone(&self.remote);
        let user = user.clone();
        let entries = state.len();
        self.arm(Box::pin(async move {
            match remote.merge_write(&user, D::KIND, fields).await {
                Ok(()) => debug!(%user, kind = %D::KIND, entries, "Persisted coalesced state"),
                Err(e) => {
                    warn!(%user, kind = %D::KIND, error = %e, "Remote write failed, dropping");
                }
            }
        }));
    }

    /// Arm `task` in the pending slot after the window, replacing whatever
    /// was waiting there.
    pub(crate) fn arm(&self, task: Task) {
        let mut pending = self.lock();
        if let Some(previous) = pending.take() {
            self.scheduler.cancel(previous);
        }

        let in_flight = InFlight::enter(&self.in_flight);
        let task: Task = Box::pin(async move {
            let _in_flight = in_flight;
            task.await;
        });
        *pending = Some(self.scheduler.schedule(self.window, task));
    }

    /// Drop the pending write, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.lock().take() {
            self.scheduler.cancel(token);
            debug!(kind = %D::KIND, "Cancelled pending remote write");
        }
    }

    /// Whether a write is waiting for its window to elapse.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.lock()
            .is_some_and(|token| self.scheduler.is_pending(token))
    }

    /// Wait until nothing is waiting for its window or still running.
    pub async fn settled(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

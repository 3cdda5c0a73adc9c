//! Per-document state, cache and gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use atelier_core::{SyncDocument, UserId};

use crate::cache::DeviceCache;
use crate::gateway::PersistenceGateway;
use crate::merge::MergeResult;
use crate::remote::RemoteStore;
use crate::subscriber::RemoteApply;

/// Outcome of dispatching a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The reducer produced a new state.
    Applied,
    /// The command was a no-op.
    Unchanged,
    /// `Replace` is not accepted from callers.
    Rejected,
}

/// One synchronized document.
///
/// Every mutation runs under `state`'s lock and mirrors the result to the
/// device cache before the lock is released, so the cache sees transitions in
/// reducer order.
///
/// `merge_owed` is set while the sign-in merge for this document has failed
/// and not yet been retried successfully. Local state must then never be
/// written as-is, since it may lack items only the remote document holds.
pub(crate) struct Lane<D, R> {
    state: Mutex<D>,
    merge_owed: AtomicBool,
    pub(crate) cache: DeviceCache<D>,
    pub(crate) gateway: PersistenceGateway<D, R>,
}

impl<D: SyncDocument, R: RemoteStore> Lane<D, R> {
    pub(crate) fn new(cache: DeviceCache<D>, gateway: PersistenceGateway<D, R>) -> Self {
        Self {
            state: Mutex::new(D::default()),
            merge_owed: AtomicBool::new(false),
            cache,
            gateway,
        }
    }

    fn lock(&self) -> MutexGuard<'_, D> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> D {
        self.lock().clone()
    }

    /// Swap in a whole state through the reducer's `Replace`.
    fn replace(guard: &mut MutexGuard<'_, D>, next: D) {
        let current = std::mem::take(&mut **guard);
        **guard = current.apply(D::replace(next));
    }

    /// Load the device cache into local state.
    pub(crate) fn hydrate(&self) {
        let mut state = self.lock();
        let cached = self.cache.load().unwrap_or_default();
        Self::replace(&mut state, cached);
    }

    /// Apply a caller command, scheduling a remote write for `target`.
    pub(crate) fn dispatch(&self, command: D::Command, target: Option<&UserId>) -> Dispatch {
        if D::is_replace(&command) {
            warn!(kind = %D::KIND, "Rejected Replace dispatched by a caller");
            return Dispatch::Rejected;
        }

        let mut state = self.lock();
        let next = state.clone().apply(command);
        if next == *state {
            return Dispatch::Unchanged;
        }
        *state = next;
        self.cache.save(&state);
        if let Some(user) = target {
            self.gateway.schedule(user, &state);
        }
        Dispatch::Applied
    }

    pub(crate) fn merge_owed(&self) -> bool {
        self.merge_owed.load(Ordering::SeqCst)
    }

    pub(crate) fn owe_merge(&self) {
        self.merge_owed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn forgive_merge(&self) {
        self.merge_owed.store(false, Ordering::SeqCst);
    }

    /// Adopt a remote snapshot, unless a local write is still waiting to go
    /// out (the snapshot predates it).
    ///
    /// While a merge is owed the snapshot is unioned into local state instead.
    pub(crate) fn apply_remote(&self, next: D) -> RemoteApply {
        let mut state = self.lock();
        if self.merge_owed() {
            let folded = D::merge(&state, &next);
            if folded == *state {
                return RemoteApply::Unchanged;
            }
            Self::replace(&mut state, folded);
            self.cache.save(&state);
            return RemoteApply::Folded;
        }
        if self.gateway.has_pending() {
            return RemoteApply::Suppressed;
        }
        if next == *state {
            return RemoteApply::Unchanged;
        }
        Self::replace(&mut state, next);
        self.cache.save(&state);
        RemoteApply::Applied
    }

    /// Install a merge result.
    ///
    /// If commands were dispatched while the merge ran, local state no longer
    /// equals `guest`; the drift is merged onto the result and written through
    /// the gateway rather than discarded.
    pub(crate) fn adopt(&self, user: &UserId, guest: &D, result: MergeResult<D>) {
        let mut state = self.lock();
        self.forgive_merge();
        if *state == *guest {
            Self::replace(&mut state, result.merged);
        } else {
            let adopted = D::merge(&state, &result.merged);
            debug!(kind = %D::KIND, "Local state changed during merge, folding in");
            Self::replace(&mut state, adopted);
            self.gateway.schedule(user, &state);
        }
        self.cache.save(&state);
    }
}

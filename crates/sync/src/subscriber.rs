//! Live feed of remote changes into local state.
//!
//! While a user is signed in, each of their documents is followed and every
//! snapshot is offered to a [`RemoteSink`] (the engine). The sink decides
//! whether the snapshot may replace local state; the subscriber only decodes
//! and forwards.

use std::sync::Weak;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, trace, warn};

use atelier_core::{SyncDocument, UserId};

use crate::remote::{RemoteStore, Subscription, from_document};

/// What became of a remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    /// Local state was replaced.
    Applied,
    /// Local state already matched.
    Unchanged,
    /// The sign-in merge has not gone through yet, so the snapshot was
    /// unioned into local state instead of replacing it.
    Folded,
    /// Ignored: a merge is in flight, the user changed, or a local write is
    /// still pending.
    Suppressed,
}

/// Receives decoded remote snapshots.
pub trait RemoteSink<D: SyncDocument>: Send + Sync + 'static {
    fn apply_remote(&self, user: &UserId, state: D) -> RemoteApply;
}

/// Spawns the per-document subscription tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteSubscriber;

impl RemoteSubscriber {
    /// Open a subscription to `user`'s document of kind `D` and forward its
    /// snapshots to `sink` on a background task.
    ///
    /// Returns `None` if the subscription could not be opened. The task ends
    /// when the feed closes, when the sink is dropped, or when the returned
    /// handle is aborted.
    pub async fn start<D, R, S>(remote: &R, sink: Weak<S>, user: &UserId) -> Option<JoinHandle<()>>
    where
        D: SyncDocument,
        R: RemoteStore,
        S: RemoteSink<D>,
    {
        let subscription = match remote.subscribe(user, D::KIND).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(%user, kind = %D::KIND, error = %e, "Failed to open remote subscription");
                return None;
            }
        };

        let span = info_span!("remote_subscriber", %user, kind = %D::KIND);
        Some(tokio::spawn(
            Self::pump::<D, S>(subscription, sink, user.clone()).instrument(span),
        ))
    }

    async fn pump<D, S>(mut subscription: Subscription, sink: Weak<S>, user: UserId)
    where
        D: SyncDocument,
        S: RemoteSink<D>,
    {
        while let Some(document) = subscription.next().await {
            let Some(sink) = sink.upgrade() else {
                break;
            };

            let state = match from_document::<D::Envelope>(document) {
                Ok(envelope) => D::from_envelope(envelope),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable remote snapshot");
                    continue;
                }
            };

            let entries = state.len();
            match sink.apply_remote(&user, state) {
                RemoteApply::Applied => debug!(entries, "Applied remote snapshot"),
                RemoteApply::Unchanged => trace!("Remote snapshot matches local state"),
                RemoteApply::Folded => debug!(entries, "Folded remote snapshot into unmerged state"),
                RemoteApply::Suppressed => debug!(entries, "Suppressed remote snapshot"),
            }
        }
        debug!("Remote subscription ended");
    }
}

//! One-shot sign-in reconciliation.
//!
//! When a guest signs in, whatever they collected while signed out is unioned
//! onto the account's remote document and the result written back. This runs
//! once per sign-in transition and never for later remote updates, which are
//! simply adopted (see [`crate::subscriber`]).

use tracing::{debug, info, instrument, warn};

use atelier_core::{SyncDocument, UserId};

use crate::error::RemoteError;
use crate::remote::{RemoteStore, from_document, to_document};

/// What a successful reconciliation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult<D> {
    /// The remote state as read before the merge.
    pub remote: D,
    /// The new authoritative state.
    pub merged: D,
    /// Whether `merged` had to be written back.
    pub wrote: bool,
}

/// Unions a guest state onto the remote document.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeResolver;

impl MergeResolver {
    /// Reconcile `guest` with `user`'s remote document.
    ///
    /// An absent or undecodable remote document counts as empty. The write is
    /// skipped when the union equals what is already stored, so running this
    /// again with an empty guest state leaves the remote untouched.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the remote read or write fails. Nothing has
    /// been written in that case unless the write itself partially applied.
    #[instrument(skip_all, fields(%user, kind = %D::KIND, guest = guest.len()))]
    pub async fn reconcile<D, R>(
        remote: &R,
        user: &UserId,
        guest: &D,
    ) -> Result<MergeResult<D>, RemoteError>
    where
        D: SyncDocument,
        R: RemoteStore,
    {
        let stored = match remote.fetch(user, D::KIND).await? {
            Some(document) => match from_document::<D::Envelope>(document) {
                Ok(envelope) => D::from_envelope(envelope),
                Err(e) => {
                    warn!(error = %e, "Remote document undecodable, treating as empty");
                    D::default()
                }
            },
            None => D::default(),
        };

        let merged = if guest.is_empty() {
            stored.clone()
        } else {
            D::merge(guest, &stored)
        };

        if merged == stored {
            debug!(entries = merged.len(), "Remote already up to date");
            return Ok(MergeResult {
                remote: stored,
                merged,
                wrote: false,
            });
        }

        let fields = to_document(&merged.to_envelope(chrono::Utc::now()))?;
        remote.merge_write(user, D::KIND, fields).await?;
        info!(
            remote = stored.len(),
            merged = merged.len(),
            "Merged guest state into remote document"
        );

        Ok(MergeResult {
            remote: stored,
            merged,
            wrote: true,
        })
    }
}

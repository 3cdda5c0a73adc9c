//! The two synchronized documents behind one trait.
//!
//! The sync engine is generic over [`SyncDocument`], so the cart and the
//! wishlist share the same device cache, gateway, subscriber and merge code.

use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cart::{CartCommand, CartState};
use crate::envelope::{CartEnvelope, WishlistEnvelope};
use crate::wishlist::{WishlistCommand, WishlistState};

/// Which per-user document a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cart,
    Wishlist,
}

impl DocumentKind {
    /// Path segment and device storage key for this document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown document kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document kind: {0}")]
pub struct UnknownDocumentKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownDocumentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Self::Cart),
            "wishlist" => Ok(Self::Wishlist),
            other => Err(UnknownDocumentKind(other.to_owned())),
        }
    }
}

/// A locally held state that is mirrored to a remote per-user document.
pub trait SyncDocument:
    Clone + PartialEq + Default + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Commands accepted by this document's reducer.
    type Command: fmt::Debug + Send;
    /// Shape written to and read from the remote document.
    type Envelope: Serialize + DeserializeOwned + Send;

    const KIND: DocumentKind;

    /// The reducer.
    #[must_use]
    fn apply(self, command: Self::Command) -> Self;

    /// Wrap a whole state as this document's `Replace` command.
    fn replace(state: Self) -> Self::Command;

    /// Whether `command` is a whole-state replacement.
    ///
    /// Replacement is reserved for hydration, merge and remote updates;
    /// user dispatch must not issue it.
    fn is_replace(command: &Self::Command) -> bool;

    /// One-shot sign-in reconciliation of a guest state with the remote one.
    #[must_use]
    fn merge(guest: &Self, remote: &Self) -> Self;

    fn to_envelope(&self, updated_at: DateTime<Utc>) -> Self::Envelope;

    fn from_envelope(envelope: Self::Envelope) -> Self;

    fn is_empty(&self) -> bool;

    /// Number of entries, for logging.
    fn len(&self) -> usize;
}

impl SyncDocument for CartState {
    type Command = CartCommand;
    type Envelope = CartEnvelope;

    const KIND: DocumentKind = DocumentKind::Cart;

    fn apply(self, command: CartCommand) -> Self {
        Self::apply(self, command)
    }

    fn replace(state: Self) -> CartCommand {
        CartCommand::Replace(state)
    }

    fn is_replace(command: &CartCommand) -> bool {
        matches!(command, CartCommand::Replace(_))
    }

    fn merge(guest: &Self, remote: &Self) -> Self {
        Self::merge(guest, remote)
    }

    fn to_envelope(&self, updated_at: DateTime<Utc>) -> CartEnvelope {
        CartEnvelope::from_state(self, updated_at)
    }

    fn from_envelope(envelope: CartEnvelope) -> Self {
        envelope.into_state()
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl SyncDocument for WishlistState {
    type Command = WishlistCommand;
    type Envelope = WishlistEnvelope;

    const KIND: DocumentKind = DocumentKind::Wishlist;

    fn apply(self, command: WishlistCommand) -> Self {
        Self::apply(self, command)
    }

    fn replace(state: Self) -> WishlistCommand {
        WishlistCommand::Replace(state)
    }

    fn is_replace(command: &WishlistCommand) -> bool {
        matches!(command, WishlistCommand::Replace(_))
    }

    fn merge(guest: &Self, remote: &Self) -> Self {
        Self::merge(guest, remote)
    }

    fn to_envelope(&self, updated_at: DateTime<Utc>) -> WishlistEnvelope {
        WishlistEnvelope::from_state(self, updated_at)
    }

    fn from_envelope(envelope: WishlistEnvelope) -> Self {
        envelope.into_state()
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

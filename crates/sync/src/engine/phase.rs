//! Session phase and the `Replace` gate.

use core::fmt;

use thiserror::Error;

use atelier_core::UserId;

/// Where the engine is in the sign-in lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Signed out. Local state is guest state, backed by the device cache.
    #[default]
    Idle,
    /// Reconciling the guest state with `user`'s remote documents.
    Merging { user: UserId },
    /// Signed in: local changes are written through, remote changes adopted.
    Subscribed { user: UserId },
}

/// Who is asking to replace local state wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceSource {
    /// Loading the device cache at startup.
    Hydration,
    /// The one-shot sign-in merge.
    Merge,
    /// A snapshot from the remote subscription.
    Remote,
}

/// An illegal phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot start a merge while {0}")]
    NotIdle(Phase),

    #[error("no merge in flight for {0}")]
    NotMerging(UserId),

    #[error("cannot hydrate while {0}")]
    HydrateWhileActive(Phase),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Merging { user } => write!(f, "merging for {user}"),
            Self::Subscribed { user } => write!(f, "subscribed as {user}"),
        }
    }
}

impl Phase {
    /// The signed-in (or signing-in) user.
    #[must_use]
    pub const fn user(&self) -> Option<&UserId> {
        match self {
            Self::Idle => None,
            Self::Merging { user } | Self::Subscribed { user } => Some(user),
        }
    }

    /// The user whose documents local changes are written to.
    ///
    /// Only set once the merge has finished; changes made while merging are
    /// folded in when it completes.
    #[must_use]
    pub const fn write_target(&self) -> Option<&UserId> {
        match self {
            Self::Subscribed { user } => Some(user),
            Self::Idle | Self::Merging { .. } => None,
        }
    }

    /// Whether `user`'s remote documents are being followed.
    #[must_use]
    pub fn is_subscribed_as(&self, user: &UserId) -> bool {
        matches!(self, Self::Subscribed { user: current } if current == user)
    }

    /// Whether `source` may replace local state in this phase.
    #[must_use]
    pub const fn permits(&self, source: ReplaceSource) -> bool {
        matches!(
            (self, source),
            (Self::Idle, ReplaceSource::Hydration)
                | (Self::Merging { .. }, ReplaceSource::Merge)
                | (Self::Subscribed { .. }, ReplaceSource::Remote)
        )
    }

    /// Idle → Merging.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::NotIdle` from any other phase.
    pub fn begin_merge(&mut self, user: UserId) -> Result<(), TransitionError> {
        match self {
            Self::Idle => {
                *self = Self::Merging { user };
                Ok(())
            }
            _ => Err(TransitionError::NotIdle(self.clone())),
        }
    }

    /// Merging → Subscribed, for the user the merge was started for.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::NotMerging` if no merge for `user` is in
    /// flight.
    pub fn finish_merge(&mut self, user: &UserId) -> Result<(), TransitionError> {
        match self {
            Self::Merging { user: merging } if merging == user => {
                *self = Self::Subscribed { user: user.clone() };
                Ok(())
            }
            _ => Err(TransitionError::NotMerging(user.clone())),
        }
    }

    /// Back to Idle, returning the previous phase.
    pub fn reset(&mut self) -> Self {
        std::mem::take(self)
    }
}

//! The sync engine: owner of local cart and wishlist state.
//!
//! A [`SyncEngine`] is constructed explicitly and shared by cloning (it is an
//! `Arc` inside). It wires the components together:
//!
//! ```text
//! dispatch ─► reducer ─► device cache
//!                    └─► gateway (debounced) ─► remote store
//! remote store ─► subscriber ─► Replace (when Subscribed)
//! sign_in ─► merge resolver ─► Replace (while Merging)
//! ```
//!
//! Which component may replace local state is decided by the [`Phase`]:
//! hydration while idle, the merge while merging, remote snapshots once
//! subscribed. Locks are always taken phase first, then lane.

mod lane;
mod phase;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use atelier_core::{
    CartCommand, CartState, LineItem, ProductId, SyncDocument, UserId, WishlistCommand,
    WishlistState,
};

use crate::cache::{DeviceCache, DeviceStorage};
use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::gateway::PersistenceGateway;
use crate::merge::MergeResolver;
use crate::remote::RemoteStore;
use crate::scheduler::Scheduler;
use crate::subscriber::{RemoteApply, RemoteSink, RemoteSubscriber};

use lane::Lane;

pub use lane::Dispatch;
pub use phase::{Phase, ReplaceSource, TransitionError};

/// Events from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(UserId),
    SignedOut,
}

/// Outcome of a catalog-checked cart change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    Applied,
    Unchanged,
    /// The product has no stock; nothing was changed.
    OutOfStock,
    /// The request exceeded what the product allows. For quantity changes
    /// the line was clamped to the limit.
    AtStockLimit,
}

impl From<Dispatch> for CartChange {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Applied => Self::Applied,
            Dispatch::Unchanged | Dispatch::Rejected => Self::Unchanged,
        }
    }
}

/// Cart and wishlist state, kept in sync with the remote store.
pub struct SyncEngine<R: RemoteStore> {
    inner: Arc<EngineInner<R>>,
}

impl<R: RemoteStore> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteStore> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("phase", &*self.inner.phase())
            .finish_non_exhaustive()
    }
}

struct EngineInner<R: RemoteStore> {
    /// Handle for tasks that call back into the engine.
    this: Weak<Self>,
    remote: Arc<R>,
    phase: Mutex<Phase>,
    /// Serializes sign-in and sign-out.
    transitions: tokio::sync::Mutex<()>,
    cart: Lane<CartState, R>,
    wishlist: Lane<WishlistState, R>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteStore> Drop for EngineInner<R> {
    fn drop(&mut self) {
        let subscriptions = self
            .subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in subscriptions.drain(..) {
            handle.abort();
        }
    }
}

/// Access to a lane by document type.
trait HasLane<D: SyncDocument, R: RemoteStore> {
    fn lane(&self) -> &Lane<D, R>;
}

impl<R: RemoteStore> HasLane<CartState, R> for EngineInner<R> {
    fn lane(&self) -> &Lane<CartState, R> {
        &self.cart
    }
}

impl<R: RemoteStore> HasLane<WishlistState, R> for EngineInner<R> {
    fn lane(&self) -> &Lane<WishlistState, R> {
        &self.wishlist
    }
}

impl<R: RemoteStore> EngineInner<R> {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a command and write it through, or hand it to the owed merge.
    fn dispatch<D: SyncDocument>(&self, command: D::Command) -> Dispatch
    where
        Self: HasLane<D, R>,
    {
        let phase = self.phase();
        let lane = HasLane::<D, R>::lane(self);
        if !lane.merge_owed() {
            return lane.dispatch(command, phase.write_target());
        }

        let outcome = lane.dispatch(command, None);
        if let (Dispatch::Applied, Some(user)) = (outcome, phase.write_target()) {
            self.arm_merge_retry::<D>(user);
        }
        outcome
    }

    /// Reconcile one document and install the result.
    async fn merge_lane<D: SyncDocument>(&self, user: &UserId)
    where
        Self: HasLane<D, R>,
    {
        let lane = HasLane::<D, R>::lane(self);
        let guest = lane.snapshot();

        match MergeResolver::reconcile(&*self.remote, user, &guest).await {
            Ok(result) => {
                let phase = self.phase();
                if phase.permits(ReplaceSource::Merge) && phase.user() == Some(user) {
                    lane.adopt(user, &guest, result);
                } else {
                    warn!(kind = %D::KIND, phase = %*phase, "Merge result discarded");
                }
            }
            Err(e) => {
                warn!(kind = %D::KIND, error = %e, "Sign-in merge failed, will retry");
                lane.owe_merge();
                self.arm_merge_retry::<D>(user);
            }
        }
    }

    /// Re-run a failed sign-in merge once the write window passes.
    fn arm_merge_retry<D: SyncDocument>(&self, user: &UserId)
    where
        Self: HasLane<D, R>,
    {
        let this = Weak::clone(&self.this);
        let user = user.clone();
        HasLane::<D, R>::lane(self).gateway.arm(Box::pin(async move {
            if let Some(inner) = this.upgrade() {
                inner.retry_merge::<D>(&user).await;
            }
        }));
    }

    /// Reconcile the current local state, which already holds any remote
    /// snapshots folded in since the failure, with `user`'s document.
    ///
    /// A failed retry is dropped; the next local change or remote snapshot
    /// arms another.
    async fn retry_merge<D: SyncDocument>(&self, user: &UserId)
    where
        Self: HasLane<D, R>,
    {
        let lane = HasLane::<D, R>::lane(self);
        if !lane.merge_owed() || !self.phase().is_subscribed_as(user) {
            return;
        }

        let local = lane.snapshot();
        match MergeResolver::reconcile(&*self.remote, user, &local).await {
            Ok(result) => {
                let phase = self.phase();
                if phase.is_subscribed_as(user) && lane.merge_owed() {
                    lane.adopt(user, &local, result);
                    info!(kind = %D::KIND, "Deferred sign-in merge completed");
                }
            }
            Err(e) => {
                warn!(kind = %D::KIND, error = %e, "Merge retry failed, waiting for the next change");
            }
        }
    }

    /// Drop subscriptions and pending writes and return to `Idle`.
    fn teardown(&self) -> Phase {
        let previous = self.phase().reset();
        for handle in self.subscriptions().drain(..) {
            handle.abort();
        }
        self.cart.gateway.cancel();
        self.wishlist.gateway.cancel();
        self.cart.forgive_merge();
        self.wishlist.forgive_merge();
        previous
    }
}

impl<D, R> RemoteSink<D> for EngineInner<R>
where
    D: SyncDocument,
    R: RemoteStore,
    Self: HasLane<D, R>,
{
    fn apply_remote(&self, user: &UserId, state: D) -> RemoteApply {
        let phase = self.phase();
        if !phase.permits(ReplaceSource::Remote) || phase.user() != Some(user) {
            return RemoteApply::Suppressed;
        }
        let outcome = HasLane::<D, R>::lane(self).apply_remote(state);
        if outcome == RemoteApply::Folded {
            self.arm_merge_retry::<D>(user);
        }
        outcome
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Create an engine and hydrate it from the device cache.
    ///
    /// `debounce` is the persistence gateway's quiescence window.
    #[must_use]
    pub fn new(
        remote: Arc<R>,
        storage: Arc<dyn DeviceStorage>,
        scheduler: Arc<dyn Scheduler>,
        debounce: Duration,
    ) -> Self {
        let cart = Lane::new(
            DeviceCache::new(Arc::clone(&storage)),
            PersistenceGateway::new(Arc::clone(&remote), Arc::clone(&scheduler), debounce),
        );
        let wishlist = Lane::new(
            DeviceCache::new(storage),
            PersistenceGateway::new(Arc::clone(&remote), scheduler, debounce),
        );

        let engine = Self {
            inner: Arc::new_cyclic(|this| EngineInner {
                this: Weak::clone(this),
                remote,
                phase: Mutex::new(Phase::Idle),
                transitions: tokio::sync::Mutex::new(()),
                cart,
                wishlist,
                subscriptions: Mutex::new(Vec::new()),
            }),
        };
        engine.inner.cart.hydrate();
        engine.inner.wishlist.hydrate();
        engine
    }

    /// Reload local state from the device cache.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::HydrateWhileActive` unless signed out.
    pub fn hydrate(&self) -> Result<(), TransitionError> {
        let phase = self.inner.phase();
        if !phase.permits(ReplaceSource::Hydration) {
            return Err(TransitionError::HydrateWhileActive(phase.clone()));
        }
        self.inner.cart.hydrate();
        self.inner.wishlist.hydrate();
        Ok(())
    }

    /// Current session phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.phase().clone()
    }

    #[must_use]
    pub fn cart(&self) -> CartState {
        self.inner.cart.snapshot()
    }

    #[must_use]
    pub fn wishlist(&self) -> WishlistState {
        self.inner.wishlist.snapshot()
    }

    /// Apply a cart command. `Replace` is rejected.
    pub fn dispatch_cart(&self, command: CartCommand) -> Dispatch {
        self.inner.dispatch::<CartState>(command)
    }

    /// Apply a wishlist command. `Replace` is rejected.
    pub fn dispatch_wishlist(&self, command: WishlistCommand) -> Dispatch {
        self.inner.dispatch::<WishlistState>(command)
    }

    /// Whether either document has a remote write waiting for its window.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.inner.cart.gateway.has_pending() || self.inner.wishlist.gateway.has_pending()
    }

    /// Wait until no remote write is waiting for its window or still in
    /// flight, for either document.
    pub async fn writes_settled(&self) {
        tokio::join!(
            self.inner.cart.gateway.settled(),
            self.inner.wishlist.gateway.settled(),
        );
    }

    /// Add one unit of `item`, checked against live stock.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the product cannot be looked up. The cart is
    /// left unchanged.
    #[instrument(skip(self, item, catalog), fields(product_id = %item.product_id))]
    pub async fn add_to_cart<C: Catalog>(
        &self,
        item: LineItem,
        catalog: &C,
    ) -> Result<CartChange, CatalogError> {
        let product = catalog.product(&item.product_id).await?;
        if product.stock == 0 {
            return Ok(CartChange::OutOfStock);
        }

        let in_cart = self
            .cart()
            .get(&item.product_id)
            .map_or(0, |line| line.quantity);
        if in_cart >= product.max_quantity() {
            debug!(in_cart, stock = product.stock, "Add refused at stock limit");
            return Ok(CartChange::AtStockLimit);
        }

        Ok(self.dispatch_cart(CartCommand::Add(item)).into())
    }

    /// Set a line's quantity, clamped to `[1, stock]`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the product cannot be looked up. The cart is
    /// left unchanged.
    #[instrument(skip(self, catalog))]
    pub async fn set_cart_quantity<C: Catalog>(
        &self,
        product_id: &ProductId,
        quantity: u32,
        catalog: &C,
    ) -> Result<CartChange, CatalogError> {
        let product = catalog.product(product_id).await?;
        let limit = product.max_quantity();
        if limit == 0 {
            return Ok(CartChange::OutOfStock);
        }

        let clamped = quantity.clamp(1, limit);
        let dispatched = self.dispatch_cart(CartCommand::SetQuantity(product_id.clone(), clamped));
        if quantity > limit {
            Ok(CartChange::AtStockLimit)
        } else {
            Ok(dispatched.into())
        }
    }

    /// Checkout succeeded: empty the cart.
    pub fn complete_checkout(&self) -> Dispatch {
        info!("Checkout completed, clearing cart");
        self.dispatch_cart(CartCommand::Clear)
    }

    /// Sign in as `user`: merge the guest state into the account, then follow
    /// the account's documents.
    ///
    /// Signing in as the current user is a no-op; signing in as someone else
    /// signs the current user out first. If a document's merge fails, local
    /// state is kept and the merge is retried after the write window. Until
    /// it succeeds, remote snapshots are unioned into local state and local
    /// changes are carried by the retry instead of being written directly.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the phase machine refuses a transition,
    /// which indicates a bug rather than a runtime condition.
    #[instrument(skip_all, fields(user_id = %user))]
    pub async fn sign_in(&self, user: UserId) -> Result<(), TransitionError> {
        let _transition = self.inner.transitions.lock().await;

        let current = self.phase();
        match current.user() {
            Some(existing) if *existing == user => {
                debug!("Already signed in");
                return Ok(());
            }
            Some(existing) => {
                info!(previous = %existing, "Switching account");
                self.inner.teardown();
            }
            None => {}
        }

        self.inner.phase().begin_merge(user.clone())?;

        tokio::join!(
            self.inner.merge_lane::<CartState>(&user),
            self.inner.merge_lane::<WishlistState>(&user),
        );

        self.inner.phase().finish_merge(&user)?;

        let weak = Arc::downgrade(&self.inner);
        let remote = &*self.inner.remote;
        let (cart, wishlist) = tokio::join!(
            RemoteSubscriber::start::<CartState, _, _>(remote, weak.clone(), &user),
            RemoteSubscriber::start::<WishlistState, _, _>(remote, weak, &user),
        );
        self.inner
            .subscriptions()
            .extend(cart.into_iter().chain(wishlist));

        info!(
            cart = self.inner.cart.snapshot().len(),
            wishlist = self.inner.wishlist.snapshot().len(),
            "Signed in"
        );
        Ok(())
    }

    /// Sign out: stop following the remote and drop pending writes.
    ///
    /// Local state is kept and continues as guest state.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let _transition = self.inner.transitions.lock().await;
        let previous = self.inner.teardown();
        if let Some(user) = previous.user() {
            info!(user_id = %user, "Signed out");
        }
    }

    /// React to an identity provider event.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sign_in`].
    pub async fn handle_identity(&self, event: IdentityEvent) -> Result<(), TransitionError> {
        match event {
            IdentityEvent::SignedIn(user) => self.sign_in(user).await,
            IdentityEvent::SignedOut => {
                self.sign_out().await;
                Ok(())
            }
        }
    }

    /// Drive the engine from a stream of identity events until the sender is
    /// dropped.
    pub async fn follow_identity(&self, mut events: mpsc::Receiver<IdentityEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_identity(event).await {
                warn!(error = %e, "Identity event rejected");
            }
        }
        debug!("Identity feed closed");
    }
}

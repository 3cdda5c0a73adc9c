//! CLI command implementations.
//!
//! Cart and wishlist commands run against the device cache in
//! `ATELIER_CACHE_DIR`. Without `--user` they edit the guest state only.
//! With `--user` the engine first signs in against the configured docstore,
//! reconciling the guest state with the remote documents, and waits for the
//! debounced write of the change before exiting.

pub mod cart;
pub mod migrate;
pub mod wishlist;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use atelier_core::UserId;
use atelier_sync::config::ConfigError;
use atelier_sync::{
    FileStorage, HttpRemoteStore, MemoryRemoteStore, RemoteStore, Result, SyncConfig, SyncEngine,
    TokioScheduler,
};

pub use cart::CartAction;
pub use wishlist::WishlistAction;

/// Upper bound on waiting for writes once the debounce window has passed.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Something to do with an open engine.
#[derive(Debug)]
pub enum Action {
    Cart(CartAction),
    Wishlist(WishlistAction),
    /// Print both documents after sign-in.
    Show,
}

/// Open an engine, optionally sign in, run `action` and flush.
///
/// # Errors
///
/// Returns `SyncError` if the remote is not configured for a signed-in
/// session, the catalog cannot be read, or the sign-in is refused.
pub async fn session(
    config: &SyncConfig,
    user: Option<UserId>,
    catalog: &Path,
    action: Action,
) -> Result<()> {
    let Some(user) = user else {
        let engine = open_engine(MemoryRemoteStore::new(), config);
        return execute(&engine, catalog, action).await;
    };

    let remote = config
        .remote
        .as_ref()
        .ok_or_else(|| ConfigError::MissingEnvVar("ATELIER_REMOTE_URL".to_string()))?;
    let engine = open_engine(HttpRemoteStore::new(remote)?, config);

    engine.sign_in(user).await?;
    execute(&engine, catalog, action).await?;
    flush(&engine, config.debounce).await;
    Ok(())
}

fn open_engine<R: RemoteStore>(remote: R, config: &SyncConfig) -> SyncEngine<R> {
    SyncEngine::new(
        Arc::new(remote),
        Arc::new(FileStorage::new(&config.cache_dir)),
        Arc::new(TokioScheduler::new()),
        config.debounce,
    )
}

async fn execute<R: RemoteStore>(engine: &SyncEngine<R>, catalog: &Path, action: Action) -> Result<()> {
    match action {
        Action::Cart(action) => cart::run(engine, catalog, action).await,
        Action::Wishlist(action) => {
            wishlist::run(engine, action);
            Ok(())
        }
        Action::Show => {
            cart::run(engine, catalog, CartAction::Show).await?;
            wishlist::run(engine, WishlistAction::Show);
            Ok(())
        }
    }
}

/// Wait until the debounced remote writes have gone out and returned.
///
/// Writes run on spawned tasks the runtime would abort on exit.
async fn flush<R: RemoteStore>(engine: &SyncEngine<R>, debounce: Duration) {
    if engine.has_pending_writes() {
        info!("Waiting for pending remote writes");
    }
    let limit = debounce + FLUSH_TIMEOUT;
    if tokio::time::timeout(limit, engine.writes_settled()).await.is_err() {
        warn!(?limit, "Remote writes still in flight, exiting anyway");
    }
}

#[allow(clippy::print_stdout)]
fn emit(text: &str) {
    println!("{text}");
}

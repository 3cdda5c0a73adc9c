//! Atelier CLI - Database migrations and a terminal-driven cart.
//!
//! # Usage
//!
//! ```bash
//! # Run docstore database migrations
//! atelier migrate
//!
//! # Edit the guest cart kept in the device cache
//! atelier cart add P1
//! atelier wishlist toggle P7
//!
//! # Sign in, reconcile with the remote documents and print the result
//! atelier sync --user u-42
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run docstore database migrations
//! - `cart` - Show or change the cart
//! - `wishlist` - Show or toggle wishlist entries
//! - `sync` - Sign in and reconcile with the docstore
//!
//! Sync settings come from `ATELIER_*` environment variables (see
//! `atelier_sync::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atelier_core::UserId;
use atelier_sync::SyncConfig;

mod commands;

use commands::{Action, CartAction, WishlistAction};

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier CLI tools")]
struct Cli {
    /// Catalog JSON used for stock checks
    #[arg(long, env = "ATELIER_CATALOG", default_value = "catalog.json", global = true)]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run docstore database migrations
    Migrate,
    /// Show or change the cart
    Cart {
        /// Sign in as this user and sync the change
        #[arg(short, long)]
        user: Option<String>,

        #[command(subcommand)]
        action: CartAction,
    },
    /// Show or change the wishlist
    Wishlist {
        /// Sign in as this user and sync the change
        #[arg(short, long)]
        user: Option<String>,

        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Sign in, reconcile local and remote state, and print it
    Sync {
        /// User to sign in as
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_cli=info,atelier_sync=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (user, action) = match cli.command {
        Commands::Migrate => {
            commands::migrate::docstore().await?;
            return Ok(());
        }
        Commands::Cart { user, action } => (user, Action::Cart(action)),
        Commands::Wishlist { user, action } => (user, Action::Wishlist(action)),
        Commands::Sync { user } => (Some(user), Action::Show),
    };

    let config = SyncConfig::from_env()?;
    let user = user.map(UserId::new);
    commands::session(&config, user, &cli.catalog, action).await?;
    Ok(())
}

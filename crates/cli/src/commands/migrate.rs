//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! atelier migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DOCSTORE_DATABASE_URL` - `PostgreSQL` connection string for the
//!   docstore (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Docstore migrations: `crates/docstore/migrations/`

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run docstore database migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the URL is missing, the database is
/// unreachable, or a migration fails.
pub async fn docstore() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DOCSTORE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("DOCSTORE_DATABASE_URL"))?;

    tracing::info!("Connecting to docstore database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running docstore migrations...");
    sqlx::migrate!("../docstore/migrations").run(&pool).await?;

    tracing::info!("Docstore migrations complete!");
    Ok(())
}

//! Sync client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `ATELIER_REMOTE_URL` - Base URL of the document store. When unset the
//!   client runs guest-only and never talks to a remote.
//! - `ATELIER_REMOTE_TOKEN` - Bearer token for the document store (required
//!   when `ATELIER_REMOTE_URL` is set)
//! - `ATELIER_CACHE_DIR` - Directory for the device cache (default: `.atelier`)
//! - `ATELIER_SYNC_DEBOUNCE_MS` - Quiescence window for remote writes
//!   (default: 1500, range 1..=60000)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default quiescence window before a coalesced remote write is issued.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Sync client configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote document store, if any.
    pub remote: Option<RemoteConfig>,
    /// Directory holding the device cache files.
    pub cache_dir: PathBuf,
    /// Debounce window for the persistence gateway.
    pub debounce: Duration,
}

/// Remote document store connection settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://docs.atelier.gallery/`
    pub base_url: Url,
    /// Bearer token presented on every request
    pub token: SecretString,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: None,
            cache_dir: PathBuf::from(".atelier"),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, or if the
    /// remote URL is set without a token.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let remote = match get_optional_env("ATELIER_REMOTE_URL") {
            Some(raw) => Some(RemoteConfig {
                base_url: parse_base_url("ATELIER_REMOTE_URL", &raw)?,
                token: SecretString::from(get_required_env("ATELIER_REMOTE_TOKEN")?),
            }),
            None => None,
        };
        let cache_dir = PathBuf::from(get_env_or_default("ATELIER_CACHE_DIR", ".atelier"));
        let debounce = parse_debounce(
            "ATELIER_SYNC_DEBOUNCE_MS",
            &get_env_or_default("ATELIER_SYNC_DEBOUNCE_MS", "1500"),
        )?;

        Ok(Self {
            remote,
            cache_dir,
            debounce,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a base URL, making sure relative joins keep its path.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse the debounce window in milliseconds.
fn parse_debounce(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let ms = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if ms == 0 || ms > MAX_DEBOUNCE_MS {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 1 and {MAX_DEBOUNCE_MS} ms (got {ms})"),
        ));
    }
    Ok(Duration::from_millis(ms))
}

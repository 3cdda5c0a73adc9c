//! HTTP middleware stack for the docstore.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing, with a `request_id` field)
//! 3. Request ID (add unique ID to each request)
//! 4. Bearer token check (document routes only; `/health` is open)

pub mod auth;
pub mod request_id;

pub use auth::require_api_token;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};

//! Atelier Core - cart and wishlist domain library.
//!
//! This crate provides the types and pure reducers shared by every Atelier
//! component:
//! - `sync` - Client-side sync engine (device cache, remote persistence, merge)
//! - `docstore` - Per-user document service backing the remote copies
//! - `cli` - Command-line tools for migrations and driving a local cart
//!
//! # Architecture
//!
//! The core crate contains only types, reducers and traits - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, categories and money helpers
//! - [`cart`] - Line items, the cart state and its reducer
//! - [`wishlist`] - The wishlist set and its reducer
//! - [`envelope`] - Remote document shapes
//! - [`document`] - The `SyncDocument` trait tying a state to its document

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod document;
pub mod envelope;
pub mod types;
pub mod wishlist;

pub use cart::{CartCommand, CartState, LineItem};
pub use document::{DocumentKind, SyncDocument, UnknownDocumentKind};
pub use envelope::{CartEnvelope, WishlistEnvelope};
pub use types::*;
pub use wishlist::{WishlistCommand, WishlistState};

//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod category;
pub mod id;
pub mod money;

pub use category::{Category, UNIQUE_CATEGORIES, is_unique_category};
pub use id::*;
pub use money::{format_amount, line_total};

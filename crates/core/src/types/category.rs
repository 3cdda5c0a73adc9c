//! Product categories and the uniqueness rule.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Categories of one-of-a-kind physical works.
///
/// Items in these categories can never be stacked in a cart.
pub const UNIQUE_CATEGORIES: &[&str] = &["original", "painting", "sculpture", "drawing"];

/// A catalog category name, as reported by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Create a category from its catalog name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the category name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this category holds one-of-a-kind works.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        is_unique_category(self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// Returns `true` when products of `category` are pinned to a quantity of 1.
///
/// This is the only place the uniqueness rule lives; the add path, the
/// quantity path and the sign-in merge all go through it.
#[must_use]
pub fn is_unique_category(category: &Category) -> bool {
    let name = category.as_str().trim();
    UNIQUE_CATEGORIES
        .iter()
        .any(|unique| unique.eq_ignore_ascii_case(name))
}

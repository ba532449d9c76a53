//! The three kinds of change the store broadcasts.
//!
//! Every successful mutation maps to exactly one [`ChangeKind`], which
//! selects the notification channel the resulting view is published on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of mutation that produced a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A new entity was inserted.
    Added,
    /// An existing entity was merged with new state.
    Updated,
    /// An entity was removed; the view carries its last state.
    Removed,
}

impl ChangeKind {
    /// All kinds, in channel order.
    pub const ALL: [Self; 3] = [Self::Added, Self::Updated, Self::Removed];

    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Store error types.
//!
//! [`StoreError`] is the central error type returned by every fallible
//! store operation. Each variant carries a stable numeric code so that
//! embedding applications can map failures without matching on strings.

use crate::domain::EntityId;

/// Errors returned by [`crate::service::EntityStore`] operations.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 2000–2999 | State / Not Found     |
/// | 3000–3999 | Collaborator failures |
/// | 5000–5999 | Lifecycle             |
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `add` was called for an id that is already stored.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityId),

    /// `update` was called for an id that is not stored.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The persister failed. The in-memory change that preceded the call
    /// has already been applied and is not rolled back.
    #[error(transparent)]
    Persistence(anyhow::Error),

    /// The converter could not build an entity from a view.
    #[error(transparent)]
    Conversion(anyhow::Error),

    /// The store has been closed; the operation was not applied.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::AlreadyExists(_) => 2001,
            Self::NotFound(_) => 2002,
            Self::Persistence(_) => 3001,
            Self::Conversion(_) => 3002,
            Self::Closed => 5001,
        }
    }

    /// Returns `true` for validation failures a caller can recover from
    /// (the store state is unchanged).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::NotFound(_))
    }
}

/// Errors raised while loading [`crate::config::StoreConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

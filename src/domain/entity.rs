//! Capability traits for the values the store holds and hands out.
//!
//! The store is generic over three collaborators supplied by the
//! embedding application:
//!
//! - an [`Entity`]: the mutable domain object owned by the store,
//! - a [`View`]: the immutable snapshot crossing the store boundary,
//! - a [`Converter`]: projection between the two.

use super::EntityId;

/// Mutable, uniquely identified domain object owned by the store.
///
/// The store only ever requires the ability to read the id and to merge
/// state from another instance of the same type; it imposes no class
/// hierarchy.
pub trait Entity: Send + Sync + 'static {
    /// Identifier assigned at creation time. Must never change.
    fn id(&self) -> &EntityId;

    /// Updates this entity in place from `other`.
    ///
    /// The store has already checked that `other` targets the same id
    /// before calling this; merge semantics are owned by the entity.
    fn merge_from(&mut self, other: Self)
    where
        Self: Sized;
}

/// Immutable snapshot of an entity used for input and output.
pub trait View: Clone + Send + Sync + 'static {
    /// Identifier of the entity this view describes.
    fn id(&self) -> &EntityId;
}

/// Projection between entities and views.
///
/// Called synchronously by the store while it holds the gate for the
/// entity's id.
pub trait Converter<E, V>: Send + Sync {
    /// Projects an entity into a view.
    fn to_view(&self, entity: &E) -> V;

    /// Builds a new, owned entity from a view.
    ///
    /// # Errors
    ///
    /// Returns an error if the view cannot be turned into a valid
    /// entity. The store forwards it unchanged as
    /// [`crate::error::StoreError::Conversion`].
    fn from_view(&self, view: &V) -> anyhow::Result<E>;
}

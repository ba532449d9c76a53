//! Persistence port and reference adapters.
//!
//! The store mirrors every successful mutation to a [`Persister`]. How
//! and where entities are stored durably is up to the implementation;
//! the store only calls the port synchronously, while holding the gate
//! for the entity's id, and forwards any error unchanged.

pub mod in_memory;
pub mod models;

use std::sync::Arc;

use crate::domain::EntityId;

pub use in_memory::InMemoryPersister;
pub use models::{PersistOp, PersistRecord};

/// Durability backend invoked after every validated mutation.
///
/// Implementations must be safe to call from many threads at once;
/// calls for the same id are never concurrent.
pub trait Persister<E>: Send + Sync {
    /// Stores a newly added entity.
    ///
    /// # Errors
    ///
    /// Any backend failure. The entity is already in the store's map
    /// when this fails.
    fn add(&self, entity: &E) -> anyhow::Result<()>;

    /// Stores the merged state of an existing entity.
    ///
    /// # Errors
    ///
    /// Any backend failure. The merge has already been applied in memory
    /// when this fails.
    fn update(&self, entity: &E) -> anyhow::Result<()>;

    /// Deletes the entity with the given id.
    ///
    /// # Errors
    ///
    /// Any backend failure. The entity has already left the store's map
    /// when this fails.
    fn remove(&self, id: &EntityId) -> anyhow::Result<()>;
}

impl<E, P> Persister<E> for Arc<P>
where
    P: Persister<E> + ?Sized,
{
    fn add(&self, entity: &E) -> anyhow::Result<()> {
        (**self).add(entity)
    }

    fn update(&self, entity: &E) -> anyhow::Result<()> {
        (**self).update(entity)
    }

    fn remove(&self, id: &EntityId) -> anyhow::Result<()> {
        (**self).remove(id)
    }
}

/// Persister that accepts every call and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersister;

impl<E> Persister<E> for NullPersister {
    fn add(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }

    fn update(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove(&self, _id: &EntityId) -> anyhow::Result<()> {
        Ok(())
    }
}

//! Service layer: the entity store orchestrating gates, ports and
//! change channels.

pub mod entity_store;

pub use entity_store::EntityStore;

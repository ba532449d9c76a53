//! Domain layer: identity, capability traits, gates and change channels.
//!
//! This module contains the building blocks the store is assembled from:
//! entity identity and id minting, the entity/view/converter capability
//! traits, the per-id gate registry and the change notification channels.

pub mod change_kind;
pub mod change_notifier;
pub mod entity;
pub mod entity_id;
pub mod id_generator;
pub mod lock_registry;

pub use change_kind::ChangeKind;
pub use change_notifier::{ChangeNotifier, Subscription};
pub use entity::{Converter, Entity, View};
pub use entity_id::EntityId;
pub use id_generator::{IdGenerator, SequentialIds, UuidIds};
pub use lock_registry::{GateGuard, GatePolicy, LockRegistry};

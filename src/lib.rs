//! # keyed-store
//!
//! Concurrency-safe, keyed, in-memory entity store.
//!
//! The store holds the authoritative copy of each entity, serializes every
//! operation on a given id through a per-id gate, mirrors each successful
//! mutation to a pluggable persistence backend and broadcasts the
//! resulting view to observers. Operations on different ids run in
//! parallel.
//!
//! ## Architecture
//!
//! ```text
//! Callers (any thread)
//!     │
//!     ├── EntityStore (service/)
//!     │     ├── LockRegistry    one gate per id (domain/)
//!     │     ├── Converter       entity <-> view (domain/)
//!     │     ├── Persister       durability port (persistence/)
//!     │     └── ChangeNotifier  added / updated / removed (domain/)
//!     │
//!     └── Subscriptions (one queue per observer)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::StoreConfig;
pub use domain::{
    ChangeKind, Converter, Entity, EntityId, GatePolicy, IdGenerator, SequentialIds, Subscription,
    UuidIds, View,
};
pub use error::StoreError;
pub use persistence::Persister;
pub use service::EntityStore;

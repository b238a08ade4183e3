//! Append-only event store boundary.
//!
//! An infrastructure-facing abstraction for storing and loading tenant-scoped
//! event streams without making any storage assumptions. The in-memory
//! implementation is the reference one; a database-backed store plugs in at
//! the same trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

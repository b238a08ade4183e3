//! Infrastructure layer: event store, command dispatch, read models,
//! projections and the application services consumed by the edit surface.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use projections::{LotBalance, LotBalancesProjection, StockLevelsProjection};
pub use read_model::{InMemoryTenantStore, TenantStore};
pub use services::{AppliedLine, CountLineRequest, InventoryService, SaveOutcome, ServiceError};

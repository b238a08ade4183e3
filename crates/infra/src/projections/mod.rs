//! Projection implementations (read model builders).
//!
//! Projections consume ledger events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Tenant-isolated**: Data is partitioned by tenant
//! - **Idempotent**: Safe for at-least-once delivery

pub mod cursors;
pub mod lot_balances;
pub mod stock_levels;

pub use lot_balances::{LotBalance, LotBalancesError, LotBalancesProjection};
pub use stock_levels::{StockLevelsError, StockLevelsProjection};

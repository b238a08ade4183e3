//! `fleetdepot-catalog` — stock item identity and the read-only registry boundary.
//!
//! The catalog never mutates stock levels; quantities and average costs are
//! owned by the stockroom ledger and only *read* through [`StockItemRegistry`].

pub mod item;
pub mod registry;

pub use item::{StockItemDetails, StockItemId, StockItemKind};
pub use registry::{StockItemRecord, StockItemRegistry};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fleetdepot_core::AggregateId;

/// Stock item identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What kind of stock an item is.
///
/// `Part` is lot-tracked (brake pads, filters, alternators): every receipt
/// creates a batch that issues must name. `Supply` is bulk-counted (diesel,
/// coolant, shop rags): one running quantity, no batch traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockItemKind {
    Part,
    Supply,
}

impl StockItemKind {
    pub fn is_lot_tracked(self) -> bool {
        self == StockItemKind::Part
    }
}

/// Catalog attributes of a stock item (identity-independent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemDetails {
    pub name: String,
    /// Unit of measure as displayed (e.g. "ea", "L", "kg").
    pub unit: String,
    /// Replenishment floor; on-hand below this shows up in the
    /// below-minimum registry listing.
    pub minimum_stock: Decimal,
}

impl StockItemDetails {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, minimum_stock: Decimal) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            minimum_stock,
        }
    }
}

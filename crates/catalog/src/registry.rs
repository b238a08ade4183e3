use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fleetdepot_core::TenantId;

use crate::item::{StockItemDetails, StockItemId, StockItemKind};

/// Read-model row for one stock item: catalog identity plus the current
/// ledger-owned figures (on-hand quantity, weighted-average unit cost).
///
/// Mutated only by ledger events flowing through a projection; consumers
/// treat it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemRecord {
    pub item_id: StockItemId,
    pub kind: StockItemKind,
    pub details: StockItemDetails,
    pub on_hand: Decimal,
    pub average_cost: Decimal,
}

impl StockItemRecord {
    pub fn new(item_id: StockItemId, kind: StockItemKind, details: StockItemDetails) -> Self {
        Self {
            item_id,
            kind,
            details,
            on_hand: Decimal::ZERO,
            average_cost: Decimal::ZERO,
        }
    }

    /// Current inventory value of this item (on-hand × average cost).
    pub fn stock_value(&self) -> Decimal {
        self.on_hand * self.average_cost
    }

    pub fn is_below_minimum(&self) -> bool {
        self.on_hand < self.details.minimum_stock
    }
}

/// Read-only lookup boundary every other component consumes.
///
/// Implemented by the infra stock-levels projection; the trait exists so the
/// engines and services never see a concrete store type.
pub trait StockItemRegistry: Send + Sync {
    fn get(&self, tenant_id: TenantId, item_id: &StockItemId) -> Option<StockItemRecord>;

    fn list(&self, tenant_id: TenantId) -> Vec<StockItemRecord>;

    fn list_below_minimum(&self, tenant_id: TenantId) -> Vec<StockItemRecord> {
        self.list(tenant_id)
            .into_iter()
            .filter(StockItemRecord::is_below_minimum)
            .collect()
    }
}

impl<R> StockItemRegistry for Arc<R>
where
    R: StockItemRegistry + ?Sized,
{
    fn get(&self, tenant_id: TenantId, item_id: &StockItemId) -> Option<StockItemRecord> {
        (**self).get(tenant_id, item_id)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<StockItemRecord> {
        (**self).list(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdepot_core::AggregateId;

    fn record(on_hand: i64, minimum: i64) -> StockItemRecord {
        let mut r = StockItemRecord::new(
            StockItemId::new(AggregateId::new()),
            StockItemKind::Part,
            StockItemDetails::new("Brake pad", "ea", Decimal::from(minimum)),
        );
        r.on_hand = Decimal::from(on_hand);
        r
    }

    #[test]
    fn below_minimum_compares_on_hand_to_threshold() {
        assert!(record(3, 5).is_below_minimum());
        assert!(!record(5, 5).is_below_minimum());
    }

    #[test]
    fn stock_value_is_quantity_times_cost() {
        let mut r = record(4, 0);
        r.average_cost = Decimal::new(250, 2); // 2.50
        assert_eq!(r.stock_value(), Decimal::from(10));
    }
}

//! Stock levels projection: the StockItem Registry read model.
//!
//! Builds one [`StockItemRecord`] per registered item from stockroom events
//! and serves the read-only [`StockItemRegistry`] boundary every other
//! component looks stock up through.

use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetdepot_catalog::{StockItemId, StockItemRecord, StockItemRegistry};
use fleetdepot_core::TenantId;
use fleetdepot_events::EventEnvelope;
use fleetdepot_inventory::{StockroomEvent, StockroomId};

use crate::projections::cursors::StreamCursors;
use crate::read_model::TenantStore;

/// Stream type this projection follows.
pub const STOCKROOM_AGGREGATE_TYPE: &str = "inventory.stockroom";

#[derive(Debug, Error)]
pub enum StockLevelsError {
    #[error("failed to deserialize stockroom event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock levels projection: kind, catalog details, on-hand quantity and
/// weighted-average cost per item.
///
/// Rebuildable from stockroom events. Tenant-isolated.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: TenantStore<StockItemId, StockItemRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<StockItemId, StockItemRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// Get the record for a specific item.
    pub fn get(&self, tenant_id: TenantId, item_id: &StockItemId) -> Option<StockItemRecord> {
        self.store.get(tenant_id, item_id)
    }

    /// List all item records for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockItemRecord> {
        self.store.list(tenant_id)
    }

    /// Items whose on-hand quantity dropped under their minimum stock.
    pub fn list_below_minimum(&self, tenant_id: TenantId) -> Vec<StockItemRecord> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(StockItemRecord::is_below_minimum)
            .collect()
    }

    /// Apply one envelope into the read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockLevelsError> {
        if envelope.aggregate_type() != STOCKROOM_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursors.position(tenant_id, aggregate_id);

        if seq == 0 {
            return Err(StockLevelsError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery; already applied.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(StockLevelsError::NonMonotonicSequence { last, found: seq });
        }

        let ev: StockroomEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockLevelsError::Deserialize(e.to_string()))?;

        let (event_tenant, stockroom_id) = stream_identity(&ev);
        if event_tenant != tenant_id {
            return Err(StockLevelsError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if stockroom_id.0 != aggregate_id {
            return Err(StockLevelsError::TenantIsolation(
                "event stockroom_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            StockroomEvent::StockroomEstablished(_) => {}
            StockroomEvent::ItemRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.item_id,
                    StockItemRecord::new(e.item_id, e.kind, e.details),
                );
            }
            StockroomEvent::AdjustmentApplied(e) => {
                for effect in &e.effects {
                    self.apply_effect(tenant_id, effect.item_id, effect.new_on_hand, effect.new_average_cost);
                }
            }
            StockroomEvent::CountReconciled(e) => {
                for effect in &e.effects {
                    self.apply_effect(tenant_id, effect.item_id, effect.new_on_hand, effect.new_average_cost);
                }
            }
        }

        self.cursors.record(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockLevelsError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
                self.cursors.clear_tenant(t);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }

    fn apply_effect(
        &self,
        tenant_id: TenantId,
        item_id: StockItemId,
        new_on_hand: rust_decimal::Decimal,
        new_average_cost: rust_decimal::Decimal,
    ) {
        if let Some(mut record) = self.store.get(tenant_id, &item_id) {
            record.on_hand = new_on_hand;
            record.average_cost = new_average_cost;
            self.store.upsert(tenant_id, item_id, record);
        }
    }
}

fn stream_identity(event: &StockroomEvent) -> (TenantId, StockroomId) {
    match event {
        StockroomEvent::StockroomEstablished(e) => (e.tenant_id, e.stockroom_id),
        StockroomEvent::ItemRegistered(e) => (e.tenant_id, e.stockroom_id),
        StockroomEvent::AdjustmentApplied(e) => (e.tenant_id, e.stockroom_id),
        StockroomEvent::CountReconciled(e) => (e.tenant_id, e.stockroom_id),
    }
}

impl<S> StockItemRegistry for StockLevelsProjection<S>
where
    S: TenantStore<StockItemId, StockItemRecord>,
{
    fn get(&self, tenant_id: TenantId, item_id: &StockItemId) -> Option<StockItemRecord> {
        StockLevelsProjection::get(self, tenant_id, item_id)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<StockItemRecord> {
        StockLevelsProjection::list(self, tenant_id)
    }
}

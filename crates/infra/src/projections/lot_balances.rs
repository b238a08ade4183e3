//! Lot balances projection: the allocator's read path.
//!
//! One row per lot, so an operator picking the batch to issue from sees
//! remaining quantities and acquisition costs without rehydrating the
//! stockroom. Ordering is oldest-first; selection stays manual.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetdepot_catalog::StockItemId;
use fleetdepot_core::TenantId;
use fleetdepot_events::EventEnvelope;
use fleetdepot_inventory::{AdjustmentId, AdjustmentType, LotId, StockroomEvent};

use crate::projections::cursors::StreamCursors;
use crate::projections::stock_levels::STOCKROOM_AGGREGATE_TYPE;
use crate::read_model::TenantStore;

/// Read model: one purchase batch with its live remainder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotBalance {
    pub lot_id: LotId,
    pub part_id: StockItemId,
    pub remaining: Decimal,
    pub unit_cost: Decimal,
    pub entry_ref: AdjustmentId,
    pub received_at: DateTime<Utc>,
}

impl LotBalance {
    pub fn is_available(&self) -> bool {
        self.remaining > Decimal::ZERO
    }
}

#[derive(Debug, Error)]
pub enum LotBalancesError {
    #[error("failed to deserialize stockroom event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Lot balances projection, rebuildable from stockroom events.
#[derive(Debug)]
pub struct LotBalancesProjection<S>
where
    S: TenantStore<LotId, LotBalance>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> LotBalancesProjection<S>
where
    S: TenantStore<LotId, LotBalance>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, lot_id: &LotId) -> Option<LotBalance> {
        self.store.get(tenant_id, lot_id)
    }

    /// Available lots of a part, oldest acquisition first.
    pub fn available_for(&self, tenant_id: TenantId, part_id: &StockItemId) -> Vec<LotBalance> {
        let mut lots: Vec<LotBalance> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| l.part_id == *part_id && l.is_available())
            .collect();
        lots.sort_by_key(|l| (l.received_at, l.lot_id.0));
        lots
    }

    /// Apply one envelope into the read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), LotBalancesError> {
        if envelope.aggregate_type() != STOCKROOM_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursors.position(tenant_id, aggregate_id);

        if seq == 0 {
            return Err(LotBalancesError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery; already applied.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(LotBalancesError::NonMonotonicSequence { last, found: seq });
        }

        let ev: StockroomEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| LotBalancesError::Deserialize(e.to_string()))?;

        if let StockroomEvent::AdjustmentApplied(e) = ev {
            for effect in &e.effects {
                let Some(lot_id) = effect.lot_id else {
                    continue;
                };
                match e.adjustment_type {
                    AdjustmentType::Entry => {
                        self.store.upsert(
                            tenant_id,
                            lot_id,
                            LotBalance {
                                lot_id,
                                part_id: effect.item_id,
                                remaining: effect.lot_remaining.unwrap_or(Decimal::ZERO),
                                unit_cost: effect.lot_unit_cost.unwrap_or(Decimal::ZERO),
                                entry_ref: e.adjustment_id,
                                received_at: e.occurred_at,
                            },
                        );
                    }
                    AdjustmentType::Exit => {
                        if let (Some(mut balance), Some(remaining)) =
                            (self.store.get(tenant_id, &lot_id), effect.lot_remaining)
                        {
                            balance.remaining = remaining;
                            self.store.upsert(tenant_id, lot_id, balance);
                        }
                    }
                    AdjustmentType::Revaluation => {
                        if let (Some(mut balance), Some(unit_cost)) =
                            (self.store.get(tenant_id, &lot_id), effect.lot_unit_cost)
                        {
                            balance.unit_cost = unit_cost;
                            self.store.upsert(tenant_id, lot_id, balance);
                        }
                    }
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
    ) -> Result<(), LotBalancesError> {
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
}

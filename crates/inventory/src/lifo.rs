//! LIFO consumption preview and direct consumption of free stock.

use chrono::{DateTime, Utc};
use common::{LotId, MaterialId, SupplierId};
use doc_store::DocumentStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::costing::CostingEngine;
use crate::error::{InventoryError, Result};
use crate::ledger::LotLedger;
use crate::locks::MaterialLocks;
use crate::lot::{LotDelta, MaterialLot};

/// What consuming from one lot would take (or took).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub lot_number: String,
    pub supplier_id: SupplierId,
    pub purchase_date: DateTime<Utc>,
    pub consumed: Decimal,
    /// Free weight left in the lot afterwards.
    pub remaining_after: Decimal,
    pub price_per_kg: Decimal,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifoPreview {
    pub material_id: MaterialId,
    pub requested: Decimal,
    pub lots: Vec<LotDraw>,
    pub total_cost: Decimal,
    pub avg_cost_per_kg: Decimal,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    pub material_id: MaterialId,
    pub consumed: Decimal,
    pub lots: Vec<LotDraw>,
    pub total_cost: Decimal,
    pub avg_cost_per_kg: Decimal,
}

struct Plan {
    draws: Vec<LotDraw>,
    shortfall: Decimal,
    total_cost: Decimal,
}

/// Walks free stock newest-first until `quantity` is covered.
fn plan(lots: &[MaterialLot], quantity: Decimal) -> Plan {
    let mut remaining = quantity;
    let mut draws = Vec::new();
    let mut total_cost = Decimal::ZERO;

    for lot in lots {
        if remaining <= Decimal::ZERO {
            break;
        }
        let free = lot.available_weight();
        if free <= Decimal::ZERO {
            continue;
        }

        let consumed = free.min(remaining);
        let cost = consumed * lot.pricing.price_per_kg;
        draws.push(LotDraw {
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            supplier_id: lot.supplier_id,
            purchase_date: lot.purchase_date,
            consumed,
            remaining_after: free - consumed,
            price_per_kg: lot.pricing.price_per_kg,
            cost,
        });
        total_cost += cost;
        remaining -= consumed;
    }

    Plan {
        draws,
        shortfall: remaining.max(Decimal::ZERO),
        total_cost,
    }
}

fn average(total_cost: Decimal, quantity: Decimal) -> Decimal {
    if quantity > Decimal::ZERO {
        total_cost / quantity
    } else {
        Decimal::ZERO
    }
}

#[derive(Clone)]
pub struct LifoPlanner<S> {
    ledger: LotLedger<S>,
    costing: CostingEngine<S>,
    locks: MaterialLocks,
}

impl<S: DocumentStore + Clone> LifoPlanner<S> {
    pub fn new(ledger: LotLedger<S>, costing: CostingEngine<S>, locks: MaterialLocks) -> Self {
        Self {
            ledger,
            costing,
            locks,
        }
    }

    /// Shows which lots consuming `quantity` kilograms would draw from.
    /// Nothing is written.
    #[tracing::instrument(skip(self))]
    pub async fn preview(&self, material_id: MaterialId, quantity: Decimal) -> Result<LifoPreview> {
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::validation("quantity must be positive"));
        }

        let lots = self.ledger.list_active_lots(material_id).await?;
        let plan = plan(&lots, quantity);

        Ok(LifoPreview {
            material_id,
            requested: quantity,
            avg_cost_per_kg: average(plan.total_cost, quantity),
            total_cost: plan.total_cost,
            feasible: plan.shortfall.is_zero(),
            lots: plan.draws,
        })
    }

    /// Consumes `quantity` kilograms of unreserved stock, newest lots first.
    ///
    /// Lengths shrink in proportion to weight. Fails without writing anything
    /// if free stock is short.
    #[tracing::instrument(skip(self))]
    pub async fn consume(&self, material_id: MaterialId, quantity: Decimal) -> Result<Consumption> {
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::validation("quantity must be positive"));
        }

        let draws = {
            let _guard = self.locks.acquire(material_id).await;
            let lots = self.ledger.list_active_lots(material_id).await?;
            let plan = plan(&lots, quantity);

            if plan.shortfall > Decimal::ZERO {
                warn!(%material_id, shortage = %plan.shortfall, "direct consumption refused");
                return Err(InventoryError::InsufficientStock {
                    material_id,
                    shortage: plan.shortfall,
                    partial: Vec::new(),
                });
            }

            for draw in &plan.draws {
                self.ledger
                    .apply_delta(
                        draw.lot_id,
                        LotDelta::consume(draw.consumed).with_length_rescale(),
                    )
                    .await?;
            }
            plan.draws
        };

        self.costing.recompute_material_inventory(material_id).await?;

        let total_cost: Decimal = draws.iter().map(|d| d.cost).sum();
        metrics::counter!("lot_consumptions_total").increment(1);
        info!(%material_id, %quantity, lots = draws.len(), "material consumed");

        Ok(Consumption {
            material_id,
            consumed: quantity,
            avg_cost_per_kg: average(total_cost, quantity),
            total_cost,
            lots: draws,
        })
    }
}

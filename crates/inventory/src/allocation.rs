//! Allocation Engine: LIFO reservation, release and consumption of lot stock.

use common::{LotId, MaterialId};
use doc_store::DocumentStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::costing::CostingEngine;
use crate::error::{InventoryError, Result};
use crate::ledger::LotLedger;
use crate::locks::MaterialLocks;
use crate::lot::{LotDelta, MaterialLot};

/// Weight reserved against one lot by an allocate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAllocation {
    pub lot_id: LotId,
    pub lot_number: String,
    pub material_id: MaterialId,
    pub weight: Decimal,
}

/// A reservation to hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRelease {
    pub lot_id: LotId,
    pub weight: Decimal,
}

impl From<&LotAllocation> for LotRelease {
    fn from(allocation: &LotAllocation) -> Self {
        Self {
            lot_id: allocation.lot_id,
            weight: allocation.weight,
        }
    }
}

#[derive(Clone)]
pub struct AllocationEngine<S> {
    ledger: LotLedger<S>,
    costing: CostingEngine<S>,
    locks: MaterialLocks,
}

impl<S: DocumentStore + Clone> AllocationEngine<S> {
    pub fn new(ledger: LotLedger<S>, costing: CostingEngine<S>, locks: MaterialLocks) -> Self {
        Self {
            ledger,
            costing,
            locks,
        }
    }

    /// Reserves `required_weight` kilograms of a material, newest lots first.
    ///
    /// A non-positive requirement reserves nothing. If free stock runs out the
    /// call fails with `InsufficientStock`; reservations already written stay
    /// in place and are listed in the error for the caller to release.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(
        &self,
        material_id: MaterialId,
        required_weight: Decimal,
    ) -> Result<Vec<LotAllocation>> {
        if required_weight <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        let _guard = self.locks.acquire(material_id).await;
        let lots = self.ledger.list_active_lots(material_id).await?;

        let mut remaining_to_allocate = required_weight;
        let mut allocations = Vec::new();

        for lot in lots {
            if remaining_to_allocate <= Decimal::ZERO {
                break;
            }

            let available = lot.available_weight();
            if available <= Decimal::ZERO {
                continue;
            }

            let take = available.min(remaining_to_allocate);
            if let Err(e) = self.ledger.apply_delta(lot.id, LotDelta::reserve(take)).await {
                self.release_after_failure(&allocations).await;
                return Err(e);
            }

            allocations.push(LotAllocation {
                lot_id: lot.id,
                lot_number: lot.lot_number,
                material_id,
                weight: take,
            });
            remaining_to_allocate -= take;
        }

        if remaining_to_allocate > Decimal::ZERO {
            metrics::counter!("lot_allocation_shortages_total").increment(1);
            warn!(
                %material_id,
                shortage = %remaining_to_allocate,
                partial_lots = allocations.len(),
                "insufficient stock"
            );
            return Err(InventoryError::InsufficientStock {
                material_id,
                shortage: remaining_to_allocate,
                partial: allocations,
            });
        }

        metrics::counter!("lot_allocations_total").increment(1);
        info!(%material_id, lots = allocations.len(), "material allocated");
        Ok(allocations)
    }

    /// Releases up to `amount` kilograms of a lot's reservation.
    ///
    /// Releasing more than is reserved clears the reservation.
    #[tracing::instrument(skip(self))]
    pub async fn deallocate(&self, lot_id: LotId, amount: Decimal) -> Result<MaterialLot> {
        if amount < Decimal::ZERO {
            return Err(InventoryError::validation(
                "deallocation amount must not be negative",
            ));
        }

        let lot = self.ledger.get_lot(lot_id).await?;
        let _guard = self.locks.acquire(lot.material_id).await;

        let modified = self
            .ledger
            .apply_delta_with(lot_id, |lot| {
                LotDelta::release(amount.min(lot.allocated_quantity.weight))
            })
            .await?;

        metrics::counter!("lot_deallocations_total").increment(1);
        Ok(modified.after)
    }

    /// Releases several reservations. Lots that no longer exist are skipped.
    pub async fn deallocate_many(&self, releases: &[LotRelease]) -> Result<Vec<MaterialLot>> {
        let mut released = Vec::with_capacity(releases.len());
        for release in releases {
            match self.deallocate(release.lot_id, release.weight).await {
                Ok(lot) => released.push(lot),
                Err(InventoryError::NotFound { .. }) => {
                    warn!(lot_id = %release.lot_id, "skipping release for missing lot");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }

    /// Turns `amount_used` kilograms of a reservation into consumption.
    ///
    /// Both the reservation and the remaining stock drop by the amount, each
    /// floored at zero. The material's inventory snapshot is recomputed.
    #[tracing::instrument(skip(self))]
    pub async fn convert_allocation_to_usage(
        &self,
        lot_id: LotId,
        amount_used: Decimal,
    ) -> Result<MaterialLot> {
        if amount_used < Decimal::ZERO {
            return Err(InventoryError::validation(
                "used quantity must not be negative",
            ));
        }

        let lot = self.ledger.get_lot(lot_id).await?;
        let material_id = lot.material_id;
        let modified = {
            let _guard = self.locks.acquire(material_id).await;
            self.ledger
                .apply_delta_with(lot_id, |lot| {
                    LotDelta::new(
                        -amount_used.min(lot.remaining_quantity.weight),
                        -amount_used.min(lot.allocated_quantity.weight),
                    )
                })
                .await?
        };

        self.costing.recompute_material_inventory(material_id).await?;

        metrics::counter!("lot_consumptions_total").increment(1);
        info!(
            lot_number = %modified.after.lot_number,
            remaining = %modified.after.remaining_quantity.weight,
            "allocation converted to usage"
        );
        Ok(modified.after)
    }

    /// Hands back reservations made before a store failure interrupted
    /// `allocate`. Shortages are not handled here: their partial allocations
    /// travel in the error.
    async fn release_after_failure(&self, allocations: &[LotAllocation]) {
        for allocation in allocations.iter().rev() {
            if let Err(e) = self
                .ledger
                .apply_delta(allocation.lot_id, LotDelta::release(allocation.weight))
                .await
            {
                tracing::error!(
                    lot_number = %allocation.lot_number,
                    weight = %allocation.weight,
                    error = %e,
                    "failed to release reservation after allocation error"
                );
            }
        }
    }
}

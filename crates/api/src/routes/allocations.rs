//! Availability and raw allocation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{LotId, MaterialId};
use doc_store::DocumentStore;
use inventory::{
    AvailabilityReport, InventoryError, LotAllocation, LotRelease, MaterialLot,
    MaterialRequirement,
};
use provisioning::ProvisioningError;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub requirements: Vec<MaterialRequirement>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub material_id: MaterialId,
    pub required_weight: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DeallocateRequest {
    pub releases: Vec<LotRelease>,
}

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    pub lot_id: LotId,
    pub amount_used: Decimal,
}

/// POST /allocations/check: free stock against a list of requirements.
#[tracing::instrument(skip(state, req))]
pub async fn check<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<AvailabilityReport>, ApiError> {
    let report = state
        .inventory
        .availability()
        .check_availability(&req.requirements)
        .await?;
    Ok(Json(report))
}

/// POST /allocations/allocate: reserve weight, newest lots first.
///
/// A short allocation is handed back before the 409 is returned, so the
/// endpoint either reserves everything or nothing.
#[tracing::instrument(skip(state, req))]
pub async fn allocate<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AllocateRequest>,
) -> Result<Json<Vec<LotAllocation>>, ApiError> {
    let engine = state.inventory.allocation();
    match engine.allocate(req.material_id, req.required_weight).await {
        Ok(allocations) => Ok(Json(allocations)),
        Err(InventoryError::InsufficientStock {
            material_id,
            shortage,
            partial,
        }) => {
            let releases: Vec<LotRelease> = partial.iter().rev().map(LotRelease::from).collect();
            engine.deallocate_many(&releases).await?;
            Err(InventoryError::InsufficientStock {
                material_id,
                shortage,
                partial: Vec::new(),
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /allocations/deallocate: hand reservations back.
///
/// Manual adjustment for reservations made through `/allocations/allocate`.
/// Weight held by an open work order is refused with a 409; it goes back
/// through that order's cancel, complete or delete.
#[tracing::instrument(skip(state, req))]
pub async fn deallocate<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DeallocateRequest>,
) -> Result<Json<Vec<MaterialLot>>, ApiError> {
    for release in &req.releases {
        ensure_unclaimed(&state, release.lot_id, release.weight).await?;
    }
    let lots = state
        .inventory
        .allocation()
        .deallocate_many(&req.releases)
        .await?;
    Ok(Json(lots))
}

/// POST /allocations/usage: turn part of a reservation into consumption.
///
/// Same restriction as deallocate: usage against a work order's
/// reservation is recorded through `/work-orders/{id}/usage`.
#[tracing::instrument(skip(state, req))]
pub async fn usage<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<UsageRequest>,
) -> Result<Json<MaterialLot>, ApiError> {
    ensure_unclaimed(&state, req.lot_id, req.amount_used).await?;
    let lot = state
        .inventory
        .allocation()
        .convert_allocation_to_usage(req.lot_id, req.amount_used)
        .await?;
    Ok(Json(lot))
}

/// Fails unless `weight` fits in the part of the lot's reservation that no
/// open work order accounts for.
async fn ensure_unclaimed<S: DocumentStore + Clone + 'static>(
    state: &AppState<S>,
    lot_id: LotId,
    weight: Decimal,
) -> Result<(), ApiError> {
    let lot = match state.inventory.ledger().get_lot(lot_id).await {
        Ok(lot) => lot,
        // missing lots are reported by the operation itself
        Err(InventoryError::NotFound { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let claimed = state.provisioner.claimed_weight(lot_id).await?;
    let unclaimed = (lot.allocated_quantity.weight - claimed).max(Decimal::ZERO);
    if weight > unclaimed {
        return Err(ProvisioningError::StateConflict(format!(
            "lot {} has only {unclaimed} kg reserved outside work orders",
            lot.lot_number
        ))
        .into());
    }
    Ok(())
}

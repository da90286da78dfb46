//! Work order provisioning: allocate a quotation's materials or undo it all.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use common::{LotId, MaterialId, WorkOrderId};
use doc_store::{DocumentQuery, DocumentStore, DocumentStoreExt, StoreError, Version};
use inventory::{InventoryError, InventoryService, Material, MaterialLot, MaterialRequirement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ProvisioningError, Result};
use crate::quotation::{Quotation, QuotationStatus};
use crate::requirements::{RequirementSource, normalize};
use crate::run::{ProvisioningRun, RunEvent};
use crate::work_order::{
    AllocationRecord, WorkOrder, WorkOrderStatus, work_order_number, work_order_sequence,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub quotation_id: common::QuotationId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Runs the provisioning saga and manages the resulting work orders.
///
/// A work order is only ever reported after every requirement has been
/// allocated. On any failure the allocations made so far are released in
/// reverse order and the provisional work order is deleted.
#[derive(Clone)]
pub struct WorkOrderProvisioner<S, R> {
    store: S,
    inventory: InventoryService<S>,
    requirements: R,
}

impl<S, R> WorkOrderProvisioner<S, R>
where
    S: DocumentStore + Clone,
    R: RequirementSource,
{
    pub fn new(inventory: InventoryService<S>, requirements: R) -> Self {
        Self {
            store: inventory.store().clone(),
            inventory,
            requirements,
        }
    }

    fn max_retries(&self) -> u32 {
        self.inventory.ledger().max_retries()
    }

    /// Creates a work order for a quotation with all its materials allocated.
    #[tracing::instrument(skip(self, request), fields(quotation_id = %request.quotation_id))]
    pub async fn provision(&self, request: ProvisionRequest) -> Result<WorkOrder> {
        metrics::counter!("provisioning_runs_total").increment(1);
        let started = Instant::now();

        let quotation = self
            .store
            .get_required::<Quotation>(request.quotation_id)
            .await?
            .document;
        if let Some(existing) = quotation.work_order_id {
            return Err(ProvisioningError::StateConflict(format!(
                "quotation {} already has work order {existing}",
                quotation.quote_number
            )));
        }
        if quotation.status == QuotationStatus::Rejected {
            return Err(ProvisioningError::StateConflict(format!(
                "quotation {} was rejected",
                quotation.quote_number
            )));
        }

        let raw = self.requirements.requirements_for(quotation.id).await?;
        let requirements = normalize(&raw)?;
        if requirements.is_empty() {
            return Err(ProvisioningError::validation(format!(
                "quotation {} has no material requirements",
                quotation.quote_number
            )));
        }

        let now = Utc::now();
        let work_order = WorkOrder {
            id: WorkOrderId::new(),
            work_order_number: self.next_work_order_number().await?,
            quotation_id: quotation.id,
            quote_number: quotation.quote_number.clone(),
            customer_id: quotation.customer_id,
            cable_length: quotation.cable_length,
            status: WorkOrderStatus::Provisional,
            allocated_materials: Vec::new(),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        let work_order_version = self.store.insert(&work_order).await?;

        let mut run = ProvisioningRun::new(work_order.id, quotation.id);
        let mut run_version = self.store.insert(&run).await?;

        let outcome = match self
            .allocate_all(&mut run, &mut run_version, &requirements)
            .await
        {
            Ok(()) => self.finalize(work_order, work_order_version, &run).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(work_order) => {
                if let Err(e) = run.advance(RunEvent::Allocated) {
                    error!(error = %e, "provisioning run in unexpected state");
                }
                self.save_run_logged(&run, &mut run_version).await;

                let duration = started.elapsed().as_secs_f64();
                metrics::histogram!("provisioning_duration_seconds").record(duration);
                info!(
                    work_order_number = %work_order.work_order_number,
                    lots = work_order.allocated_materials.len(),
                    total_weight = %work_order.total_allocated(),
                    duration,
                    "work order provisioned"
                );
                Ok(work_order)
            }
            Err(e) => {
                let err = self.compensate(run, run_version, e).await;
                metrics::histogram!("provisioning_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                Err(err)
            }
        }
    }

    async fn allocate_all(
        &self,
        run: &mut ProvisioningRun,
        run_version: &mut Version,
        requirements: &[MaterialRequirement],
    ) -> Result<()> {
        for requirement in requirements {
            info!(material_id = %requirement.material_id, weight = %requirement.required_weight, "allocating");
            match self
                .inventory
                .allocation()
                .allocate(requirement.material_id, requirement.required_weight)
                .await
            {
                Ok(allocations) => {
                    run.record_step(
                        requirement.material_id,
                        requirement.required_weight,
                        allocations,
                        true,
                    );
                    self.save_run(run, run_version).await?;
                }
                Err(e) => {
                    if let InventoryError::InsufficientStock { partial, .. } = &e {
                        run.record_step(
                            requirement.material_id,
                            requirement.required_weight,
                            partial.clone(),
                            false,
                        );
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Turns the provisional order into a pending one and links the quotation.
    async fn finalize(
        &self,
        mut work_order: WorkOrder,
        version: Version,
        run: &ProvisioningRun,
    ) -> Result<WorkOrder> {
        let mut names: HashMap<MaterialId, String> = HashMap::new();
        let now = Utc::now();
        let mut records = Vec::new();
        for allocation in run.allocations() {
            if !names.contains_key(&allocation.material_id) {
                let name = self
                    .store
                    .get::<Material>(allocation.material_id)
                    .await?
                    .map_or_else(|| "Unknown".to_string(), |m| m.document.name);
                names.insert(allocation.material_id, name);
            }
            let name = names
                .get(&allocation.material_id)
                .map_or("Unknown", String::as_str);
            records.push(AllocationRecord::from_allocation(allocation, name, now));
        }

        work_order.allocated_materials = records;
        work_order.status = WorkOrderStatus::Pending;
        work_order.updated_at = now;
        self.store.update(&work_order, version).await?;

        let work_order_id = work_order.id;
        self.store
            .modify::<Quotation, ProvisioningError, _>(
                work_order.quotation_id,
                self.max_retries(),
                |quotation| {
                    if let Some(existing) = quotation.work_order_id
                        && existing != work_order_id
                    {
                        return Err(ProvisioningError::StateConflict(format!(
                            "quotation {} was provisioned concurrently as {existing}",
                            quotation.quote_number
                        )));
                    }
                    let mut linked = quotation.clone();
                    linked.work_order_id = Some(work_order_id);
                    linked.updated_at = Utc::now();
                    Ok(linked)
                },
            )
            .await?;

        Ok(work_order)
    }

    /// Releases every reservation the run made, newest first, and deletes
    /// the provisional work order. Returns the error to surface.
    async fn compensate(
        &self,
        mut run: ProvisioningRun,
        mut run_version: Version,
        cause: ProvisioningError,
    ) -> ProvisioningError {
        let reason = cause.to_string();
        warn!(work_order_id = %run.work_order_id, %reason, "provisioning failed, compensating");

        if let Err(e) = run.advance(RunEvent::AllocationFailed(reason.clone())) {
            error!(error = %e, "provisioning run in unexpected state");
        }
        self.save_run_logged(&run, &mut run_version).await;

        let mut failures = Vec::new();
        for release in run.releases() {
            match self
                .inventory
                .allocation()
                .deallocate(release.lot_id, release.weight)
                .await
            {
                Ok(_) | Err(InventoryError::NotFound { .. }) => {}
                Err(e) => {
                    error!(lot_id = %release.lot_id, weight = %release.weight, error = %e, "failed to release allocation");
                    failures.push(format!("lot {}: {e}", release.lot_id));
                }
            }
        }

        match self
            .store
            .delete::<WorkOrder>(run.work_order_id, None)
            .await
        {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => {
                error!(work_order_id = %run.work_order_id, error = %e, "failed to delete provisional work order");
                failures.push(format!("work order {}: {e}", run.work_order_id));
            }
        }

        if let Err(e) = run.advance(RunEvent::Compensated(failures.clone())) {
            error!(error = %e, "provisioning run in unexpected state");
        }
        self.save_run_logged(&run, &mut run_version).await;
        metrics::counter!("provisioning_failed_total").increment(1);

        if !failures.is_empty() {
            return ProvisioningError::CompensationFailed { reason, failures };
        }
        match cause {
            ProvisioningError::Inventory(InventoryError::InsufficientStock {
                material_id,
                shortage,
                ..
            }) => ProvisioningError::Inventory(InventoryError::InsufficientStock {
                material_id,
                shortage,
                partial: Vec::new(),
            }),
            other => other,
        }
    }

    async fn save_run(&self, run: &ProvisioningRun, version: &mut Version) -> Result<()> {
        *version = self.store.update(run, *version).await?;
        Ok(())
    }

    async fn save_run_logged(&self, run: &ProvisioningRun, version: &mut Version) {
        if let Err(e) = self.save_run(run, version).await {
            error!(work_order_id = %run.work_order_id, state = %run.state, error = %e, "failed to persist provisioning run");
        }
    }

    async fn next_work_order_number(&self) -> Result<String> {
        let highest = self
            .store
            .find::<WorkOrder>(DocumentQuery::new())
            .await?
            .iter()
            .filter_map(|v| work_order_sequence(&v.document.work_order_number))
            .max()
            .unwrap_or(0);
        Ok(work_order_number(highest + 1))
    }

    pub async fn get_work_order(&self, id: WorkOrderId) -> Result<WorkOrder> {
        Ok(self.store.get_required::<WorkOrder>(id).await?.document)
    }

    /// Work orders, newest first. Provisional orders only show up when
    /// asked for explicitly.
    pub async fn list_work_orders(&self, status: Option<WorkOrderStatus>) -> Result<Vec<WorkOrder>> {
        let query = match status {
            Some(status) => DocumentQuery::new().eq("status", status.as_str()),
            None => DocumentQuery::new(),
        };
        let mut orders: Vec<WorkOrder> = self
            .store
            .find::<WorkOrder>(query)
            .await?
            .into_iter()
            .map(|v| v.document)
            .filter(|o| status.is_some() || o.status != WorkOrderStatus::Provisional)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn get_run(&self, work_order_id: WorkOrderId) -> Result<ProvisioningRun> {
        Ok(self
            .store
            .get_required::<ProvisioningRun>(work_order_id)
            .await?
            .document)
    }

    /// Releases a work order's outstanding allocations and removes it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_work_order(&self, id: WorkOrderId) -> Result<()> {
        let order = self.get_work_order(id).await?;
        if order.status == WorkOrderStatus::Provisional {
            return Err(ProvisioningError::StateConflict(format!(
                "work order {} is still being provisioned",
                order.work_order_number
            )));
        }

        self.release_outstanding(&order).await?;
        self.store.delete::<WorkOrder>(id, None).await?;

        let unlinked = self
            .store
            .modify::<Quotation, ProvisioningError, _>(order.quotation_id, self.max_retries(), |q| {
                let mut updated = q.clone();
                if updated.work_order_id == Some(id) {
                    updated.work_order_id = None;
                    updated.updated_at = Utc::now();
                }
                Ok(updated)
            })
            .await;
        match unlinked {
            Ok(_) | Err(ProvisioningError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        info!(work_order_number = %order.work_order_number, "work order deleted");
        Ok(())
    }

    /// Releases a work order's outstanding allocations and marks it cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_work_order(&self, id: WorkOrderId) -> Result<WorkOrder> {
        self.close(id, WorkOrderStatus::Cancelled).await
    }

    /// Marks a work order completed, handing unused reservations back.
    #[tracing::instrument(skip(self))]
    pub async fn complete_work_order(&self, id: WorkOrderId) -> Result<WorkOrder> {
        self.close(id, WorkOrderStatus::Completed).await
    }

    async fn close(&self, id: WorkOrderId, status: WorkOrderStatus) -> Result<WorkOrder> {
        let open = |order: &WorkOrder| {
            if order.status.is_closed() || order.status == WorkOrderStatus::Provisional {
                return Err(ProvisioningError::StateConflict(format!(
                    "work order {} is {}",
                    order.work_order_number, order.status
                )));
            }
            Ok(())
        };

        let order = self.get_work_order(id).await?;
        open(&order)?;
        self.release_outstanding(&order).await?;

        let closed = self
            .store
            .modify::<WorkOrder, ProvisioningError, _>(id, self.max_retries(), |order| {
                open(order)?;
                let mut updated = order.clone();
                updated.status = status;
                updated.updated_at = Utc::now();
                Ok(updated)
            })
            .await?;

        info!(work_order_number = %closed.after.work_order_number, %status, "work order closed");
        Ok(closed.after)
    }

    /// Hands each outstanding reservation back to its lot, most recent first.
    ///
    /// A record is marked released only once its lot has been updated, so
    /// an interrupted release can be retried without losing reservations.
    async fn release_outstanding(&self, order: &WorkOrder) -> Result<()> {
        for release in order.outstanding_releases() {
            match self
                .inventory
                .allocation()
                .deallocate(release.lot_id, release.weight)
                .await
            {
                Ok(_) => {}
                Err(InventoryError::NotFound { .. }) => {
                    warn!(lot_id = %release.lot_id, "skipping release for missing lot");
                }
                Err(e) => {
                    error!(
                        work_order_number = %order.work_order_number,
                        lot_id = %release.lot_id,
                        error = %e,
                        "failed to release work order allocation"
                    );
                    return Err(e.into());
                }
            }

            self.store
                .modify::<WorkOrder, ProvisioningError, _>(order.id, self.max_retries(), |current| {
                    let mut updated = current.clone();
                    updated.mark_lot_released(release.lot_id);
                    Ok(updated)
                })
                .await?;
        }
        Ok(())
    }

    /// Weight of a lot's reservation still held by open work orders.
    pub async fn claimed_weight(&self, lot_id: LotId) -> Result<Decimal> {
        Ok(self
            .store
            .find::<WorkOrder>(DocumentQuery::new())
            .await?
            .iter()
            .flat_map(|v| v.document.allocated_materials.iter())
            .filter(|record| record.lot_id == lot_id)
            .map(AllocationRecord::outstanding)
            .sum())
    }

    /// Converts part of a work order's reservation on a lot into consumption.
    #[tracing::instrument(skip(self))]
    pub async fn record_usage(
        &self,
        work_order_id: WorkOrderId,
        lot_id: LotId,
        quantity_used: Decimal,
    ) -> Result<(WorkOrder, MaterialLot)> {
        if quantity_used <= Decimal::ZERO {
            return Err(ProvisioningError::validation(
                "used quantity must be positive",
            ));
        }

        let recorded = self
            .store
            .modify::<WorkOrder, ProvisioningError, _>(
                work_order_id,
                self.max_retries(),
                |order| {
                    if order.status.is_closed() || order.status == WorkOrderStatus::Provisional {
                        return Err(ProvisioningError::StateConflict(format!(
                            "work order {} is {}",
                            order.work_order_number, order.status
                        )));
                    }
                    let mut updated = order.clone();
                    let record = updated
                        .allocated_materials
                        .iter_mut()
                        .find(|r| r.lot_id == lot_id)
                        .ok_or_else(|| ProvisioningError::not_found("Allocation", lot_id))?;
                    if quantity_used > record.outstanding() {
                        return Err(ProvisioningError::validation(format!(
                            "used quantity {quantity_used} exceeds the {} kg still allocated on lot {}",
                            record.outstanding(),
                            record.lot_number
                        )));
                    }
                    record.record_usage(quantity_used);
                    if updated.status == WorkOrderStatus::Pending {
                        updated.status = WorkOrderStatus::InProgress;
                    }
                    updated.updated_at = Utc::now();
                    Ok(updated)
                },
            )
            .await?;

        match self
            .inventory
            .allocation()
            .convert_allocation_to_usage(lot_id, quantity_used)
            .await
        {
            Ok(lot) => Ok((recorded.after, lot)),
            Err(e) => {
                self.revert_usage(work_order_id, lot_id, quantity_used, recorded.before.status)
                    .await;
                Err(e.into())
            }
        }
    }

    async fn revert_usage(
        &self,
        work_order_id: WorkOrderId,
        lot_id: LotId,
        quantity_used: Decimal,
        previous_status: WorkOrderStatus,
    ) {
        let reverted = self
            .store
            .modify::<WorkOrder, ProvisioningError, _>(
                work_order_id,
                self.max_retries(),
                |order| {
                    let mut updated = order.clone();
                    if let Some(record) = updated
                        .allocated_materials
                        .iter_mut()
                        .find(|r| r.lot_id == lot_id)
                    {
                        record.consumed_weight -= quantity_used;
                        record.is_consumed = record.consumed_weight >= record.quantity;
                    }
                    updated.status = previous_status;
                    Ok(updated)
                },
            )
            .await;
        if let Err(e) = reverted {
            error!(%work_order_id, %lot_id, error = %e, "failed to revert usage record");
        }
    }
}

//! Purchase orders and their receipt into the lot ledger.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{LotId, MaterialId, PurchaseOrderId, SupplierId};
use doc_store::{Document, DocumentQuery, DocumentStore, DocumentStoreExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::catalog::MaterialCatalog;
use crate::costing::CostingEngine;
use crate::error::{InventoryError, Result};
use crate::ledger::LotLedger;
use crate::lot::{MaterialLot, NewLot, Pricing, Provenance, Storage};
use crate::material::Material;
use crate::quantity::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Received and cancelled orders are closed to edits.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered material. Becomes exactly one lot on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub material_id: MaterialId,
    pub quantity: Quantity,
    pub pricing: Pricing,
    #[serde(default)]
    pub storage: Option<Storage>,
    #[serde(default)]
    pub lot_id: Option<LotId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PurchaseOrderItem {
    pub fn total_cost(&self) -> Decimal {
        self.pricing.total_for(self.quantity.weight)
    }

    fn validate(&self, position: usize) -> Result<()> {
        if self.quantity.weight <= Decimal::ZERO || !self.quantity.is_non_negative() {
            return Err(InventoryError::validation(format!(
                "item {position}: quantity must be positive"
            )));
        }
        self.pricing.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub order_date: DateTime<Utc>,
    pub status: PurchaseOrderStatus,
    pub items: Vec<PurchaseOrderItem>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for PurchaseOrder {
    type Id = PurchaseOrderId;
    const COLLECTION: &'static str = "purchase_orders";

    fn id(&self) -> PurchaseOrderId {
        self.id
    }
}

impl PurchaseOrder {
    fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(PurchaseOrderItem::total_cost).sum();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    pub items: Vec<PurchaseOrderItem>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Changes to an open purchase order. Unset fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseOrderUpdate {
    pub order_date: Option<DateTime<Utc>>,
    pub items: Option<Vec<PurchaseOrderItem>>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
}

/// Paperwork supplied when goods arrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptDetails {
    pub invoice_number: Option<String>,
    pub grn_number: Option<String>,
}

fn validate_items(items: &[PurchaseOrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(InventoryError::validation(
            "a purchase order needs at least one item",
        ));
    }
    for (i, item) in items.iter().enumerate() {
        item.validate(i + 1)?;
    }
    Ok(())
}

fn distinct_materials(items: &[PurchaseOrderItem]) -> BTreeSet<MaterialId> {
    items.iter().map(|item| item.material_id).collect()
}

#[derive(Clone)]
pub struct PurchaseOrders<S> {
    store: S,
    ledger: LotLedger<S>,
    costing: CostingEngine<S>,
    catalog: MaterialCatalog<S>,
}

impl<S: DocumentStore + Clone> PurchaseOrders<S> {
    pub fn new(
        ledger: LotLedger<S>,
        costing: CostingEngine<S>,
        catalog: MaterialCatalog<S>,
    ) -> Self {
        Self {
            store: ledger.store().clone(),
            ledger,
            costing,
            catalog,
        }
    }

    #[tracing::instrument(skip(self, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create_purchase_order(&self, input: NewPurchaseOrder) -> Result<PurchaseOrder> {
        validate_items(&input.items)?;
        for material_id in distinct_materials(&input.items) {
            if !self.store.exists::<Material>(material_id).await? {
                return Err(InventoryError::not_found("Material", material_id));
            }
        }

        let existing = self
            .store
            .count::<PurchaseOrder>(DocumentQuery::new())
            .await?;
        let now = Utc::now();
        let mut order = PurchaseOrder {
            id: PurchaseOrderId::new(),
            po_number: format!("PO-{:05}", existing + 1),
            supplier_id: input.supplier_id,
            order_date: input.order_date.unwrap_or(now),
            status: PurchaseOrderStatus::Draft,
            items: input.items,
            invoice_number: input.invoice_number,
            notes: input.notes,
            total_amount: Decimal::ZERO,
            received_at: None,
            created_at: now,
            updated_at: now,
        };
        order.recompute_total();
        self.store.insert(&order).await?;

        for material_id in distinct_materials(&order.items) {
            self.catalog
                .link_supplier(material_id, order.supplier_id)
                .await?;
        }

        info!(po_number = %order.po_number, total = %order.total_amount, "purchase order created");
        Ok(order)
    }

    pub async fn get_purchase_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder> {
        Ok(self.store.get_required::<PurchaseOrder>(id).await?.document)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_purchase_order(
        &self,
        id: PurchaseOrderId,
        update: PurchaseOrderUpdate,
    ) -> Result<PurchaseOrder> {
        if let Some(items) = &update.items {
            validate_items(items)?;
        }

        let modified = self
            .store
            .modify::<PurchaseOrder, InventoryError, _>(id, self.ledger.max_retries(), |order| {
                if order.status.is_closed() {
                    return Err(InventoryError::StateConflict(format!(
                        "purchase order {} is {}",
                        order.po_number, order.status
                    )));
                }
                let mut updated = order.clone();
                if let Some(order_date) = update.order_date {
                    updated.order_date = order_date;
                }
                if let Some(items) = &update.items {
                    updated.items = items.clone();
                }
                if let Some(invoice_number) = &update.invoice_number {
                    updated.invoice_number = Some(invoice_number.clone());
                }
                if let Some(notes) = &update.notes {
                    updated.notes = Some(notes.clone());
                }
                updated.recompute_total();
                updated.updated_at = Utc::now();
                Ok(updated)
            })
            .await?;
        Ok(modified.after)
    }

    /// Moves a draft order to `ordered`.
    #[tracing::instrument(skip(self))]
    pub async fn mark_ordered(&self, id: PurchaseOrderId) -> Result<PurchaseOrder> {
        self.transition(id, |status| match status {
            PurchaseOrderStatus::Draft => Ok(PurchaseOrderStatus::Ordered),
            other => Err(InventoryError::StateConflict(format!(
                "only draft orders can be placed, this one is {other}"
            ))),
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_purchase_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder> {
        self.transition(id, |status| match status {
            PurchaseOrderStatus::Received => Err(InventoryError::StateConflict(
                "a received purchase order cannot be cancelled".to_string(),
            )),
            _ => Ok(PurchaseOrderStatus::Cancelled),
        })
        .await
    }

    /// Books the goods in: one lot per item, dated at the order date.
    ///
    /// The order is marked received first so a concurrent receipt loses the
    /// version race. If lot creation then fails the lots made so far are
    /// retired and the order reopened.
    #[tracing::instrument(skip(self, details))]
    pub async fn receive_purchase_order(
        &self,
        id: PurchaseOrderId,
        details: ReceiptDetails,
    ) -> Result<PurchaseOrder> {
        let claimed = self
            .store
            .modify::<PurchaseOrder, InventoryError, _>(id, self.ledger.max_retries(), |order| {
                match order.status {
                    PurchaseOrderStatus::Received => {
                        return Err(InventoryError::StateConflict(format!(
                            "purchase order {} was already received",
                            order.po_number
                        )));
                    }
                    PurchaseOrderStatus::Cancelled => {
                        return Err(InventoryError::StateConflict(format!(
                            "purchase order {} is cancelled",
                            order.po_number
                        )));
                    }
                    _ => {}
                }
                if let Some(position) = order.items.iter().position(|i| i.storage.is_none()) {
                    return Err(InventoryError::validation(format!(
                        "item {}: storage location is required before receiving",
                        position + 1
                    )));
                }

                let mut updated = order.clone();
                updated.status = PurchaseOrderStatus::Received;
                updated.received_at = Some(Utc::now());
                if let Some(invoice_number) = &details.invoice_number {
                    updated.invoice_number = Some(invoice_number.clone());
                }
                updated.updated_at = Utc::now();
                Ok(updated)
            })
            .await?;
        let order = claimed.after;
        let previous_status = claimed.before.status;

        let mut lots: Vec<MaterialLot> = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let new_lot = NewLot {
                material_id: item.material_id,
                supplier_id: order.supplier_id,
                purchase_date: Some(order.order_date),
                initial_quantity: item.quantity,
                pricing: item.pricing.clone(),
                storage: item.storage.clone(),
                provenance: Provenance {
                    po_number: Some(order.po_number.clone()),
                    invoice_number: order.invoice_number.clone(),
                    grn_number: details.grn_number.clone(),
                    notes: item.notes.clone(),
                },
            };
            match self.ledger.create_lot(new_lot).await {
                Ok(lot) => lots.push(lot),
                Err(e) => {
                    self.undo_receipt(id, previous_status, &lots).await;
                    return Err(e);
                }
            }
        }

        let lot_ids: Vec<LotId> = lots.iter().map(|lot| lot.id).collect();
        let received = self
            .store
            .modify::<PurchaseOrder, InventoryError, _>(id, self.ledger.max_retries(), |order| {
                let mut updated = order.clone();
                for (item, lot_id) in updated.items.iter_mut().zip(&lot_ids) {
                    item.lot_id = Some(*lot_id);
                }
                Ok(updated)
            })
            .await?
            .after;

        for material_id in distinct_materials(&received.items) {
            self.catalog
                .link_supplier(material_id, received.supplier_id)
                .await?;
            self.costing.recompute_material_inventory(material_id).await?;
        }

        info!(po_number = %received.po_number, lots = lots.len(), "purchase order received");
        Ok(received)
    }

    async fn transition<F>(&self, id: PurchaseOrderId, next: F) -> Result<PurchaseOrder>
    where
        F: Fn(PurchaseOrderStatus) -> Result<PurchaseOrderStatus> + Send + Sync,
    {
        let modified = self
            .store
            .modify::<PurchaseOrder, InventoryError, _>(id, self.ledger.max_retries(), |order| {
                let mut updated = order.clone();
                updated.status = next(order.status)?;
                updated.updated_at = Utc::now();
                Ok(updated)
            })
            .await?;
        info!(
            po_number = %modified.after.po_number,
            from = %modified.before.status,
            to = %modified.after.status,
            "purchase order status changed"
        );
        Ok(modified.after)
    }

    async fn undo_receipt(
        &self,
        id: PurchaseOrderId,
        previous_status: PurchaseOrderStatus,
        lots: &[MaterialLot],
    ) {
        for lot in lots.iter().rev() {
            if let Err(e) = self.ledger.retire_lot(lot.id).await {
                error!(lot_number = %lot.lot_number, error = %e, "failed to retire lot after receipt error");
            }
        }
        let reopened = self
            .store
            .modify::<PurchaseOrder, InventoryError, _>(id, self.ledger.max_retries(), |order| {
                let mut updated = order.clone();
                updated.status = previous_status;
                updated.received_at = None;
                updated.updated_at = Utc::now();
                Ok(updated)
            })
            .await;
        if let Err(e) = reopened {
            error!(%id, error = %e, "failed to reopen purchase order after receipt error");
        }
    }
}

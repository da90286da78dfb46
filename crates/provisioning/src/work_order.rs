//! Work orders and the lot allocations they hold.

use chrono::{DateTime, Utc};
use common::{CustomerId, LotId, MaterialId, QuotationId, WorkOrderId};
use doc_store::Document;
use inventory::{LotAllocation, LotRelease};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    /// Allocation in progress. Never visible once provisioning returns.
    Provisional,
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Provisional => "provisional",
            WorkOrderStatus::Pending => "pending",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work order's claim on one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub material_id: MaterialId,
    pub lot_id: LotId,
    pub lot_number: String,
    pub material_name: String,
    /// Reserved weight in kilograms.
    pub quantity: Decimal,
    #[serde(default)]
    pub consumed_weight: Decimal,
    #[serde(default)]
    pub is_consumed: bool,
    /// Set once the unused part has been handed back to the lot.
    #[serde(default)]
    pub released: bool,
    pub allocated_at: DateTime<Utc>,
}

impl AllocationRecord {
    pub fn from_allocation(
        allocation: &LotAllocation,
        material_name: &str,
        allocated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            material_id: allocation.material_id,
            lot_id: allocation.lot_id,
            lot_number: allocation.lot_number.clone(),
            material_name: material_name.to_string(),
            quantity: allocation.weight,
            consumed_weight: Decimal::ZERO,
            is_consumed: false,
            released: false,
            allocated_at,
        }
    }

    /// Weight still reserved on the lot for this work order.
    pub fn outstanding(&self) -> Decimal {
        if self.released {
            Decimal::ZERO
        } else {
            (self.quantity - self.consumed_weight).max(Decimal::ZERO)
        }
    }

    pub fn record_usage(&mut self, weight: Decimal) {
        self.consumed_weight += weight;
        self.is_consumed = self.consumed_weight >= self.quantity;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub work_order_number: String,
    pub quotation_id: QuotationId,
    pub quote_number: String,
    pub customer_id: Option<CustomerId>,
    pub cable_length: Decimal,
    pub status: WorkOrderStatus,
    #[serde(default)]
    pub allocated_materials: Vec<AllocationRecord>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for WorkOrder {
    type Id = WorkOrderId;
    const COLLECTION: &'static str = "work_orders";

    fn id(&self) -> WorkOrderId {
        self.id
    }
}

impl WorkOrder {
    /// Reservations to hand back, most recent first.
    pub fn outstanding_releases(&self) -> Vec<LotRelease> {
        self.allocated_materials
            .iter()
            .rev()
            .filter(|record| record.outstanding() > Decimal::ZERO)
            .map(|record| LotRelease {
                lot_id: record.lot_id,
                weight: record.outstanding(),
            })
            .collect()
    }

    /// Marks the record holding `lot_id` as handed back.
    pub fn mark_lot_released(&mut self, lot_id: LotId) {
        for record in &mut self.allocated_materials {
            if record.lot_id == lot_id && record.outstanding() > Decimal::ZERO {
                record.released = true;
            }
        }
    }

    pub fn total_allocated(&self) -> Decimal {
        self.allocated_materials.iter().map(|r| r.quantity).sum()
    }
}

/// Formats the `sequence`-th work order number, e.g. `WO-00012`.
pub fn work_order_number(sequence: u64) -> String {
    format!("WO-{sequence:05}")
}

/// Parses the sequence out of a work order number.
pub fn work_order_sequence(number: &str) -> Option<u64> {
    number.strip_prefix("WO-")?.parse().ok()
}

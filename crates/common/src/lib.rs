//! Identifier types shared by every crate in the workspace.

mod types;

pub use types::{
    CustomerId, LotId, MaterialId, MaterialTypeId, PurchaseOrderId, QuotationId, SupplierId,
    WorkOrderId,
};

//! Inventory core for cable raw materials.
//!
//! Raw material arrives in dated lots. This crate provides:
//! - The lot ledger, the only writer of lot quantities
//! - A costing engine projecting weighted-average prices from live lots
//! - LIFO allocation, release and consumption serialised per material
//! - Availability checks, LIFO previews and direct consumption
//! - The material catalog and purchase-order receipt

pub mod allocation;
pub mod availability;
pub mod catalog;
pub mod costing;
pub mod error;
pub mod ledger;
pub mod lifo;
pub mod locks;
pub mod lot;
pub mod material;
pub mod purchase_order;
pub mod quantity;
pub mod service;

pub use allocation::{AllocationEngine, LotAllocation, LotRelease};
pub use availability::{
    AvailabilityChecker, AvailabilityReport, MaterialAvailability, MaterialRequirement,
};
pub use catalog::{CategorySummary, InventorySummary, MaterialCatalog};
pub use costing::{CostingEngine, SnapshotCache, compute_snapshot};
pub use error::{InventoryError, Result};
pub use ledger::{DEFAULT_MAX_RETRIES, LotLedger};
pub use lifo::{Consumption, LifoPlanner, LifoPreview, LotDraw};
pub use locks::MaterialLocks;
pub use lot::{
    LotDelta, LotFilter, MaterialLot, NewLot, Pricing, Provenance, Storage, StorageLocation,
};
pub use material::{
    InventorySnapshot, Material, MaterialCategory, MaterialFilter, NewMaterial,
    ReprocessInventory,
};
pub use purchase_order::{
    NewPurchaseOrder, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, PurchaseOrderUpdate,
    PurchaseOrders, ReceiptDetails,
};
pub use quantity::Quantity;
pub use service::{InventoryConfig, InventoryService};

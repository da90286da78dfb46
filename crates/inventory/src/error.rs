//! Inventory error types.

use common::MaterialId;
use doc_store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::allocation::LotAllocation;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request is malformed (negative quantities, missing fields, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Free stock could not cover the requested weight.
    ///
    /// `partial` lists the lot allocations that were made before stock ran
    /// out; the caller owns rolling them back.
    #[error("Insufficient stock for material {material_id}: short by {shortage} kg")]
    InsufficientStock {
        material_id: MaterialId,
        shortage: Decimal,
        partial: Vec<LotAllocation>,
    },

    /// The entity is in a state that does not allow the operation.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// A lot change would break a quantity invariant. Never written.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// An error occurred in the document store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl InventoryError {
    /// Creates a `NotFound` error for the given entity kind.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        InventoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        InventoryError::Validation(message.into())
    }
}

impl From<StoreError> for InventoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => InventoryError::NotFound {
                entity: entity_name(collection),
                id: id.to_string(),
            },
            other => InventoryError::Store(other),
        }
    }
}

fn entity_name(collection: &'static str) -> &'static str {
    match collection {
        "material_lots" => "Lot",
        "materials" => "Material",
        "purchase_orders" => "Purchase order",
        other => other,
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

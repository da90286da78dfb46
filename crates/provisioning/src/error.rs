use doc_store::StoreError;
use inventory::InventoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    StateConflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    /// Releasing a failed run's allocations did not fully succeed. The
    /// listed lots may still hold reservations.
    #[error("Compensation failed after '{reason}': {failures:?}")]
    CompensationFailed {
        reason: String,
        failures: Vec<String>,
    },
}

impl ProvisioningError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ProvisioningError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ProvisioningError::Validation(message.into())
    }
}

impl From<StoreError> for ProvisioningError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => ProvisioningError::NotFound {
                entity: match collection {
                    "work_orders" => "Work order",
                    "quotations" => "Quotation",
                    "provisioning_runs" => "Provisioning run",
                    other => other,
                },
                id: id.to_string(),
            },
            other => ProvisioningError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

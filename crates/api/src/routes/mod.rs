//! HTTP route handlers and the state they share.

pub mod allocations;
pub mod health;
pub mod lots;
pub mod materials;
pub mod metrics;
pub mod purchase_orders;
pub mod quotations;
pub mod work_orders;

use std::fmt::Display;
use std::str::FromStr;

use doc_store::DocumentStore;
use inventory::InventoryService;
use provisioning::{Quotations, WorkOrderProvisioner};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore> {
    pub inventory: InventoryService<S>,
    /// Reads material requirements from the stored quotations.
    pub provisioner: WorkOrderProvisioner<S, Quotations<S>>,
    pub quotations: Quotations<S>,
}

/// Parses a path segment into a typed id.
pub(crate) fn parse_id<T>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id: {e}")))
}

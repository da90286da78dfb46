//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use doc_store::StoreError;
use inventory::InventoryError;
use provisioning::ProvisioningError;
use serde_json::json;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Inventory(InventoryError),
    Provisioning(ProvisioningError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Provisioning(err) => provisioning_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn internal(message: String) -> (StatusCode, serde_json::Value) {
    tracing::error!(error = %message, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": message }),
    )
}

fn store_error_to_response(err: StoreError) -> (StatusCode, serde_json::Value) {
    match &err {
        StoreError::ConcurrencyConflict { .. } => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "error": err.to_string() })),
        _ => internal(err.to_string()),
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, serde_json::Value) {
    match err {
        InventoryError::Validation(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        InventoryError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        InventoryError::InsufficientStock {
            material_id,
            shortage,
            ..
        } => (
            StatusCode::CONFLICT,
            json!({
                "error": format!("Insufficient stock for material {material_id}"),
                "material_id": material_id,
                "shortage": shortage,
            }),
        ),
        InventoryError::StateConflict(_) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        InventoryError::Store(store) => store_error_to_response(store),
        InventoryError::Invariant(_) => internal(err.to_string()),
    }
}

fn provisioning_error_to_response(err: ProvisioningError) -> (StatusCode, serde_json::Value) {
    match err {
        ProvisioningError::Inventory(inner) => inventory_error_to_response(inner),
        ProvisioningError::Validation(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        ProvisioningError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        ProvisioningError::StateConflict(_) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        ProvisioningError::Store(store) => store_error_to_response(store),
        ProvisioningError::CompensationFailed { .. } => internal(err.to_string()),
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        ApiError::Provisioning(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MaterialId;
    use rust_decimal::Decimal;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn inventory_errors_map_to_statuses() {
        assert_eq!(
            status_of(InventoryError::validation("bad").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(InventoryError::not_found("Lot", "x").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                InventoryError::InsufficientStock {
                    material_id: MaterialId::new(),
                    shortage: Decimal::ONE,
                    partial: vec![],
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(InventoryError::Invariant("broken".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn wrapped_inventory_errors_keep_their_status() {
        let err = ProvisioningError::Inventory(InventoryError::validation("bad"));
        assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ProvisioningError::StateConflict("taken".into()).into()),
            StatusCode::CONFLICT
        );
    }
}

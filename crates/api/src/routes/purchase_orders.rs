//! Purchase order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::PurchaseOrderId;
use doc_store::DocumentStore;
use inventory::{NewPurchaseOrder, PurchaseOrder, PurchaseOrderUpdate, ReceiptDetails};

use super::{AppState, parse_id};
use crate::error::ApiError;

/// POST /purchase-orders: draft a purchase order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewPurchaseOrder>,
) -> Result<(StatusCode, Json<PurchaseOrder>), ApiError> {
    let order = state
        .inventory
        .purchase_orders()
        .create_purchase_order(req)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /purchase-orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id: PurchaseOrderId = parse_id("purchase order", &id)?;
    let order = state
        .inventory
        .purchase_orders()
        .get_purchase_order(id)
        .await?;
    Ok(Json(order))
}

/// PUT /purchase-orders/{id}: edit an open order.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseOrderUpdate>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id: PurchaseOrderId = parse_id("purchase order", &id)?;
    let order = state
        .inventory
        .purchase_orders()
        .update_purchase_order(id, req)
        .await?;
    Ok(Json(order))
}

/// POST /purchase-orders/{id}/order: mark a draft as sent to the supplier.
#[tracing::instrument(skip(state))]
pub async fn mark_ordered<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id: PurchaseOrderId = parse_id("purchase order", &id)?;
    let order = state.inventory.purchase_orders().mark_ordered(id).await?;
    Ok(Json(order))
}

/// POST /purchase-orders/{id}/receive: book the goods in as lots.
///
/// The body with invoice and GRN numbers is optional.
#[tracing::instrument(skip(state, req))]
pub async fn receive<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    req: Option<Json<ReceiptDetails>>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id: PurchaseOrderId = parse_id("purchase order", &id)?;
    let details = req.map(|Json(details)| details).unwrap_or_default();
    let order = state
        .inventory
        .purchase_orders()
        .receive_purchase_order(id, details)
        .await?;
    Ok(Json(order))
}

/// POST /purchase-orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id: PurchaseOrderId = parse_id("purchase order", &id)?;
    let order = state
        .inventory
        .purchase_orders()
        .cancel_purchase_order(id)
        .await?;
    Ok(Json(order))
}

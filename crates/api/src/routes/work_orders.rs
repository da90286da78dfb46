//! Work order provisioning and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{LotId, WorkOrderId};
use doc_store::DocumentStore;
use inventory::MaterialLot;
use provisioning::{ProvisionRequest, ProvisioningRun, WorkOrder, WorkOrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<WorkOrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    pub lot_id: LotId,
    pub quantity_used: Decimal,
}

#[derive(Serialize)]
pub struct UsageResponse {
    pub work_order: WorkOrder,
    pub lot: MaterialLot,
}

/// POST /work-orders: provision a work order from a quotation.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<WorkOrder>), ApiError> {
    let order = state.provisioner.provision(req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /work-orders: list work orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<WorkOrder>>, ApiError> {
    Ok(Json(state.provisioner.list_work_orders(params.status).await?))
}

/// GET /work-orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkOrder>, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    Ok(Json(state.provisioner.get_work_order(id).await?))
}

/// GET /work-orders/{id}/run: the provisioning run behind a work order.
#[tracing::instrument(skip(state))]
pub async fn run<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProvisioningRun>, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    Ok(Json(state.provisioner.get_run(id).await?))
}

/// DELETE /work-orders/{id}: delete an order and release its stock.
#[tracing::instrument(skip(state))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    state.provisioner.delete_work_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /work-orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkOrder>, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    Ok(Json(state.provisioner.cancel_work_order(id).await?))
}

/// POST /work-orders/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkOrder>, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    Ok(Json(state.provisioner.complete_work_order(id).await?))
}

/// POST /work-orders/{id}/usage: consume part of a lot reserved for the order.
#[tracing::instrument(skip(state, req))]
pub async fn usage<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UsageRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    let id: WorkOrderId = parse_id("work order", &id)?;
    let (work_order, lot) = state
        .provisioner
        .record_usage(id, req.lot_id, req.quantity_used)
        .await?;
    Ok(Json(UsageResponse { work_order, lot }))
}

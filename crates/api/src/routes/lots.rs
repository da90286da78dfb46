//! Lot ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{LotId, MaterialId};
use doc_store::DocumentStore;
use inventory::{LifoPreview, LotFilter, MaterialLot, NewLot};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub material_id: MaterialId,
    pub quantity: Decimal,
}

/// POST /lots: record a newly purchased lot.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewLot>,
) -> Result<(StatusCode, Json<MaterialLot>), ApiError> {
    let lot = state.inventory.create_lot(req).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

/// GET /lots: list lots matching the query filter.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<LotFilter>,
) -> Result<Json<Vec<MaterialLot>>, ApiError> {
    Ok(Json(state.inventory.ledger().list_lots(&filter).await?))
}

/// GET /lots/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MaterialLot>, ApiError> {
    let lot_id: LotId = parse_id("lot", &id)?;
    Ok(Json(state.inventory.ledger().get_lot(lot_id).await?))
}

/// GET /lots/material/{material_id}: active lots of a material, newest first.
#[tracing::instrument(skip(state))]
pub async fn by_material<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(material_id): Path<String>,
) -> Result<Json<Vec<MaterialLot>>, ApiError> {
    let material_id: MaterialId = parse_id("material", &material_id)?;
    let lots = state
        .inventory
        .ledger()
        .list_active_lots(material_id)
        .await?;
    Ok(Json(lots))
}

/// GET /lots/preview: which lots a draw of `quantity` would touch, and its cost.
#[tracing::instrument(skip(state))]
pub async fn preview<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<LifoPreview>, ApiError> {
    let preview = state
        .inventory
        .lifo()
        .preview(params.material_id, params.quantity)
        .await?;
    Ok(Json(preview))
}

/// POST /lots/{id}/retire: take a lot out of active stock.
#[tracing::instrument(skip(state))]
pub async fn retire<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MaterialLot>, ApiError> {
    let lot_id: LotId = parse_id("lot", &id)?;
    Ok(Json(state.inventory.retire_lot(lot_id).await?))
}

//! Material catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::MaterialId;
use doc_store::DocumentStore;
use inventory::{
    Consumption, InventorySnapshot, InventorySummary, Material, MaterialFilter, NewMaterial,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReprocessRequest {
    pub weight: Decimal,
    pub price_per_kg: Decimal,
}

/// POST /materials: register a material in the catalog.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewMaterial>,
) -> Result<(StatusCode, Json<Material>), ApiError> {
    let material = state.inventory.catalog().create_material(req).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// GET /materials: list materials, optionally filtered.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<MaterialFilter>,
) -> Result<Json<Vec<Material>>, ApiError> {
    let materials = state.inventory.catalog().list_materials(&filter).await?;
    Ok(Json(materials))
}

/// GET /materials/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Material>, ApiError> {
    let material_id: MaterialId = parse_id("material", &id)?;
    let material = state.inventory.catalog().get_material(material_id).await?;
    Ok(Json(material))
}

/// POST /materials/{id}/recalculate: rebuild the inventory snapshot from lots.
#[tracing::instrument(skip(state))]
pub async fn recalculate<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<InventorySnapshot>, ApiError> {
    let material_id: MaterialId = parse_id("material", &id)?;
    let snapshot = state
        .inventory
        .costing()
        .recompute_material_inventory(material_id)
        .await?;
    Ok(Json(snapshot))
}

/// POST /materials/{id}/consume: draw stock directly, newest lots first.
#[tracing::instrument(skip(state, req))]
pub async fn consume<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<Consumption>, ApiError> {
    let material_id: MaterialId = parse_id("material", &id)?;
    let consumption = state
        .inventory
        .lifo()
        .consume(material_id, req.quantity)
        .await?;
    Ok(Json(consumption))
}

/// POST /materials/{id}/reprocess: add recycled scrap.
#[tracing::instrument(skip(state, req))]
pub async fn reprocess<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReprocessRequest>,
) -> Result<Json<Material>, ApiError> {
    let material_id: MaterialId = parse_id("material", &id)?;
    let material = state
        .inventory
        .catalog()
        .add_reprocess(material_id, req.weight, req.price_per_kg)
        .await?;
    Ok(Json(material))
}

/// GET /materials/summary: stock value and low-stock counts.
#[tracing::instrument(skip(state))]
pub async fn summary<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<InventorySummary>, ApiError> {
    Ok(Json(state.inventory.catalog().inventory_summary().await?))
}

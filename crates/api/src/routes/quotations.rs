//! Quotation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::QuotationId;
use doc_store::DocumentStore;
use provisioning::{NewQuotation, Quotation};

use super::{AppState, parse_id};
use crate::error::ApiError;

/// POST /quotations: record a quotation and its material requirements.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewQuotation>,
) -> Result<(StatusCode, Json<Quotation>), ApiError> {
    let quotation = state.quotations.create_quotation(req).await?;
    Ok((StatusCode::CREATED, Json(quotation)))
}

/// GET /quotations/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Quotation>, ApiError> {
    let id: QuotationId = parse_id("quotation", &id)?;
    Ok(Json(state.quotations.get_quotation(id).await?))
}

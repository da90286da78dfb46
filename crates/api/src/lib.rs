//! HTTP API for the cable inventory service.
//!
//! Exposes the lot ledger, material catalog, purchase orders and work order
//! provisioning as REST endpoints, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use doc_store::DocumentStore;
use inventory::InventoryService;
use metrics_exporter_prometheus::PrometheusHandle;
use provisioning::{Quotations, WorkOrderProvisioner};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{allocations, lots, materials, purchase_orders, quotations, work_orders};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Materials
        .route(
            "/materials",
            post(materials::create::<S>).get(materials::list::<S>),
        )
        .route("/materials/summary", get(materials::summary::<S>))
        .route("/materials/{id}", get(materials::get::<S>))
        .route(
            "/materials/{id}/recalculate",
            post(materials::recalculate::<S>),
        )
        .route("/materials/{id}/consume", post(materials::consume::<S>))
        .route("/materials/{id}/reprocess", post(materials::reprocess::<S>))
        // Lots
        .route("/lots", post(lots::create::<S>).get(lots::list::<S>))
        .route("/lots/preview", get(lots::preview::<S>))
        .route("/lots/material/{material_id}", get(lots::by_material::<S>))
        .route("/lots/{id}", get(lots::get::<S>))
        .route("/lots/{id}/retire", post(lots::retire::<S>))
        // Allocations
        .route("/allocations/check", post(allocations::check::<S>))
        .route("/allocations/allocate", post(allocations::allocate::<S>))
        .route("/allocations/deallocate", post(allocations::deallocate::<S>))
        .route("/allocations/usage", post(allocations::usage::<S>))
        // Purchase orders
        .route("/purchase-orders", post(purchase_orders::create::<S>))
        .route(
            "/purchase-orders/{id}",
            get(purchase_orders::get::<S>).put(purchase_orders::update::<S>),
        )
        .route(
            "/purchase-orders/{id}/order",
            post(purchase_orders::mark_ordered::<S>),
        )
        .route(
            "/purchase-orders/{id}/receive",
            post(purchase_orders::receive::<S>),
        )
        .route(
            "/purchase-orders/{id}/cancel",
            post(purchase_orders::cancel::<S>),
        )
        // Quotations and work orders
        .route("/quotations", post(quotations::create::<S>))
        .route("/quotations/{id}", get(quotations::get::<S>))
        .route(
            "/work-orders",
            post(work_orders::create::<S>).get(work_orders::list::<S>),
        )
        .route(
            "/work-orders/{id}",
            get(work_orders::get::<S>).delete(work_orders::delete::<S>),
        )
        .route("/work-orders/{id}/run", get(work_orders::run::<S>))
        .route("/work-orders/{id}/cancel", post(work_orders::cancel::<S>))
        .route(
            "/work-orders/{id}/complete",
            post(work_orders::complete::<S>),
        )
        .route("/work-orders/{id}/usage", post(work_orders::usage::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the inventory services and the provisioning saga over one store.
pub fn create_state<S: DocumentStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let inventory = InventoryService::with_config(store.clone(), config.inventory());
    let quotations = Quotations::new(store);
    let provisioner = WorkOrderProvisioner::new(inventory.clone(), quotations.clone());

    Arc::new(AppState {
        inventory,
        provisioner,
        quotations,
    })
}

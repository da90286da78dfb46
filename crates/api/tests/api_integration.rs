//! Integration tests for the API server.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::routes::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{MaterialTypeId, SupplierId};
use doc_store::{DocumentQuery, DocumentStore, InMemoryDocumentStore};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    setup_with_state().0
}

fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryDocumentStore>>) {
    let state = api::create_state(InMemoryDocumentStore::new(), &Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn create_material(app: &axum::Router, name: &str) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/materials",
        Some(json!({
            "material_type_id": MaterialTypeId::new(),
            "name": name,
            "category": "metal",
            "reorder_level": "10"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn create_lot(
    app: &axum::Router,
    material_id: &str,
    day: u32,
    weight: &str,
    price: &str,
) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/lots",
        Some(json!({
            "material_id": material_id,
            "supplier_id": SupplierId::new(),
            "purchase_date": format!("2024-01-{day:02}T00:00:00Z"),
            "initial_quantity": { "weight": weight, "length": "0" },
            "pricing": { "price_per_kg": price },
            "storage": { "location": "drum" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "lot creation failed: {json}");
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_and_get_material() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;

    let (status, json) = send(&app, "GET", &format!("/materials/{material_id}"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Copper rod 8mm");
    assert_eq!(json["material_code"], "MTL-00001");
    assert_eq!(json["category"], "metal");
}

#[tokio::test]
async fn test_material_with_blank_name_is_rejected() {
    let app = setup();

    let (status, json) = send(
        &app,
        "POST",
        "/materials",
        Some(json!({
            "material_type_id": MaterialTypeId::new(),
            "name": "  ",
            "category": "plastic"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn test_invalid_and_unknown_ids() {
    let app = setup();

    let (status, _) = send(&app, "GET", "/materials/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = common::MaterialId::new();
    let (status, json) = send(&app, "GET", &format!("/materials/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_lots_are_listed_newest_first_and_costed() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let older = create_lot(&app, &material_id, 1, "50", "700").await;
    let newer = create_lot(&app, &material_id, 2, "30", "800").await;

    let (status, json) = send(&app, "GET", &format!("/lots/material/{material_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let lots = json.as_array().unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0]["id"], newer.as_str());
    assert_eq!(lots[1]["id"], older.as_str());

    // (50 × 700 + 30 × 800) / 80
    let (_, material) = send(&app, "GET", &format!("/materials/{material_id}"), None).await;
    assert_eq!(dec(&material["inventory"]["total_weight"]), d("80"));
    assert_eq!(dec(&material["inventory"]["avg_price_per_kg"]), d("737.5"));
}

#[tokio::test]
async fn test_lifo_preview_draws_newest_lot_first() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let older = create_lot(&app, &material_id, 1, "50", "700").await;
    let newer = create_lot(&app, &material_id, 2, "30", "800").await;

    let (status, json) = send(
        &app,
        "GET",
        &format!("/lots/preview?material_id={material_id}&quantity=40"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["feasible"], true);
    let draws = json["lots"].as_array().unwrap();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0]["lot_id"], newer.as_str());
    assert_eq!(dec(&draws[0]["consumed"]), d("30"));
    assert_eq!(draws[1]["lot_id"], older.as_str());
    assert_eq!(dec(&draws[1]["consumed"]), d("10"));
    // 30 × 800 + 10 × 700
    assert_eq!(dec(&json["total_cost"]), d("31000"));
}

#[tokio::test]
async fn test_short_allocation_reserves_nothing() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let older = create_lot(&app, &material_id, 1, "50", "700").await;
    let newer = create_lot(&app, &material_id, 2, "30", "800").await;

    let (status, json) = send(
        &app,
        "POST",
        "/allocations/allocate",
        Some(json!({ "material_id": material_id, "required_weight": "100" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dec(&json["shortage"]), d("20"));
    assert_eq!(json["material_id"], material_id.as_str());

    for lot_id in [older, newer] {
        let (_, lot) = send(&app, "GET", &format!("/lots/{lot_id}"), None).await;
        assert_eq!(dec(&lot["allocated_quantity"]["weight"]), Decimal::ZERO);
    }
}

#[tokio::test]
async fn test_allocate_then_deallocate() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    create_lot(&app, &material_id, 1, "50", "700").await;
    let newer = create_lot(&app, &material_id, 2, "30", "800").await;

    let (status, json) = send(
        &app,
        "POST",
        "/allocations/allocate",
        Some(json!({ "material_id": material_id, "required_weight": "20" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let allocations = json.as_array().unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0]["lot_id"], newer.as_str());

    let (status, _) = send(
        &app,
        "POST",
        "/allocations/deallocate",
        Some(json!({ "releases": [{ "lot_id": newer, "weight": "20" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, lot) = send(&app, "GET", &format!("/lots/{newer}"), None).await;
    assert_eq!(dec(&lot["allocated_quantity"]["weight"]), Decimal::ZERO);
}

#[tokio::test]
async fn test_availability_check_requires_requirements() {
    let app = setup();

    let (status, _) = send(
        &app,
        "POST",
        "/allocations/check",
        Some(json!({ "requirements": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_purchase_order_receipt_creates_lots() {
    let app = setup();
    let material_id = create_material(&app, "PVC compound").await;

    let (status, order) = send(
        &app,
        "POST",
        "/purchase-orders",
        Some(json!({
            "supplier_id": SupplierId::new(),
            "order_date": "2024-03-01T00:00:00Z",
            "items": [{
                "material_id": material_id,
                "quantity": { "weight": "200" },
                "pricing": { "price_per_kg": "95" },
                "storage": { "location": "sac", "container_count": 8 }
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "draft");
    let po_id = order["id"].as_str().unwrap().to_string();

    let (status, received) = send(
        &app,
        "POST",
        &format!("/purchase-orders/{po_id}/receive"),
        Some(json!({ "invoice_number": "INV-77" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["status"], "received");
    let lot_id = received["items"][0]["lot_id"].as_str().unwrap().to_string();

    let (_, lot) = send(&app, "GET", &format!("/lots/{lot_id}"), None).await;
    assert_eq!(dec(&lot["remaining_quantity"]["weight"]), d("200"));
    assert_eq!(lot["provenance"]["invoice_number"], "INV-77");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/purchase-orders/{po_id}/receive"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

async fn create_quotation(app: &axum::Router, requirements: Value) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/quotations",
        Some(json!({ "cable_length": "500", "requirements": requirements })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "quotation creation failed: {json}");
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_work_order_lifecycle() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let lot_id = create_lot(&app, &material_id, 1, "50", "700").await;
    let quotation_id = create_quotation(
        &app,
        json!([{ "material_id": material_id, "required_weight": 30 }]),
    )
    .await;

    let (status, order) = send(
        &app,
        "POST",
        "/work-orders",
        Some(json!({ "quotation_id": quotation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["work_order_number"], "WO-00001");
    assert_eq!(order["status"], "pending");
    let wo_id = order["id"].as_str().unwrap().to_string();

    let (_, listed) = send(&app, "GET", "/work-orders", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, usage) = send(
        &app,
        "POST",
        &format!("/work-orders/{wo_id}/usage"),
        Some(json!({ "lot_id": lot_id, "quantity_used": "10" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["work_order"]["status"], "in_progress");
    assert_eq!(dec(&usage["lot"]["remaining_quantity"]["weight"]), d("40"));
    assert_eq!(dec(&usage["lot"]["allocated_quantity"]["weight"]), d("20"));

    let (status, cancelled) = send(&app, "POST", &format!("/work-orders/{wo_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, lot) = send(&app, "GET", &format!("/lots/{lot_id}"), None).await;
    assert_eq!(dec(&lot["allocated_quantity"]["weight"]), Decimal::ZERO);

    let (status, _) = send(&app, "POST", &format!("/work-orders/{wo_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_failed_provisioning_leaves_no_work_order() {
    let app = setup();
    let copper = create_material(&app, "Copper rod 8mm").await;
    let pvc = create_material(&app, "PVC compound").await;
    let copper_lot = create_lot(&app, &copper, 1, "50", "700").await;
    create_lot(&app, &pvc, 1, "5", "95").await;
    let quotation_id = create_quotation(
        &app,
        json!([
            { "material_id": copper, "required_weight": "30" },
            { "material_id": pvc, "required_weight": "8" }
        ]),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/work-orders",
        Some(json!({ "quotation_id": quotation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dec(&json["shortage"]), d("3"));

    let (_, listed) = send(&app, "GET", "/work-orders", None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let (_, lot) = send(&app, "GET", &format!("/lots/{copper_lot}"), None).await;
    assert_eq!(dec(&lot["allocated_quantity"]["weight"]), Decimal::ZERO);
}

#[tokio::test]
async fn test_quotation_rejects_malformed_requirements() {
    let (app, state) = setup_with_state();

    let (status, _) = send(
        &app,
        "POST",
        "/quotations",
        Some(json!({ "requirements": [{ "material_id": "nope", "required_weight": 5 }] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stored = state
        .inventory
        .store()
        .count::<provisioning::Quotation>(DocumentQuery::new())
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_quotation_without_requirements_cannot_be_provisioned() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    create_lot(&app, &material_id, 1, "50", "700").await;
    let quotation_id = create_quotation(&app, json!([])).await;

    let (status, json) = send(
        &app,
        "POST",
        "/work-orders",
        Some(json!({ "quotation_id": quotation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (_, listed) = send(&app, "GET", "/work-orders", None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_quotation_requirements_are_stored() {
    let (app, state) = setup_with_state();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let quotation_id = create_quotation(
        &app,
        json!([{ "material_id": material_id, "required_weight": "12.5" }]),
    )
    .await;

    let (status, quotation) = send(&app, "GET", &format!("/quotations/{quotation_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quotation["requirements"][0]["material_id"], material_id.as_str());

    // a second app over the same store provisions from the stored document
    let restarted = api::create_app(
        api::create_state(state.inventory.store().clone(), &Config::default()),
        get_metrics_handle(),
    );
    create_lot(&restarted, &material_id, 1, "50", "700").await;
    let (status, order) = send(
        &restarted,
        "POST",
        "/work-orders",
        Some(json!({ "quotation_id": quotation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(dec(&order["allocated_materials"][0]["quantity"]), d("12.5"));
}

#[tokio::test]
async fn test_raw_release_cannot_touch_work_order_stock() {
    let app = setup();
    let material_id = create_material(&app, "Copper rod 8mm").await;
    let lot_id = create_lot(&app, &material_id, 1, "50", "700").await;
    let quotation_id = create_quotation(
        &app,
        json!([{ "material_id": material_id, "required_weight": 30 }]),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        "/work-orders",
        Some(json!({ "quotation_id": quotation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        "/allocations/deallocate",
        Some(json!({ "releases": [{ "lot_id": lot_id, "weight": "10" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/allocations/usage",
        Some(json!({ "lot_id": lot_id, "amount_used": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, lot) = send(&app, "GET", &format!("/lots/{lot_id}"), None).await;
    assert_eq!(dec(&lot["allocated_quantity"]["weight"]), d("30"));
    assert_eq!(dec(&lot["remaining_quantity"]["weight"]), d("50"));

    // weight reserved outside any work order can still be adjusted by hand
    let (status, _) = send(
        &app,
        "POST",
        "/allocations/allocate",
        Some(json!({ "material_id": material_id, "required_weight": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "POST",
        "/allocations/deallocate",
        Some(json!({ "releases": [{ "lot_id": lot_id, "weight": "5" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, lot) = send(&app, "GET", &format!("/lots/{lot_id}"), None).await;
    assert_eq!(dec(&lot["allocated_quantity"]["weight"]), d("30"));
}

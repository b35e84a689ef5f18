//! Exercises the six literal end-to-end scenarios from spec.md §8 against the
//! in-memory `Store` through the axum `Router`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use lm_ledger::auth::StaticTokenValidator;
use lm_ledger::routes::{router, AppState};
use lm_ledger::store::Store;
use lm_types::auth::{IdentityClaims, Scope};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn claims_with_scopes(azp: &str, scopes: &[Scope]) -> IdentityClaims {
    IdentityClaims {
        sub: "test-subject".into(),
        exp: 9_999_999_999,
        azp: azp.into(),
        permissions: scopes.iter().map(|s| s.as_str().to_string()).collect(),
        email: None,
        organization_id: None,
    }
}

fn test_app(claims: IdentityClaims) -> Router {
    let validator = StaticTokenValidator::new().with_token(TOKEN, claims);
    let state = AppState { store: Arc::new(Store::new()), validator: Arc::new(validator) };
    router(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, parsed)
}

#[tokio::test]
async fn admission_under_contention_admits_exactly_one_booking() {
    let app = test_app(claims_with_scopes(
        "cluster-a",
        &[Scope::ClusterEdit, Scope::ConfigEdit, Scope::ProductEdit, Scope::FeatureEdit, Scope::JobEdit, Scope::BookingEdit],
    ));

    let (_, cluster) = call(&app, "POST", "/clusters", json!({"name": "c1", "client_id": "cluster-a"})).await;
    let (_, config) = call(
        &app,
        "POST",
        "/configurations",
        json!({"name": "cfg1", "cluster_id": cluster["id"], "type": "flexlm", "grace_time": 60}),
    )
    .await;
    let (_, product) = call(&app, "POST", "/products", json!({"name": "abaqus"})).await;
    let (_, feature) = call(
        &app,
        "POST",
        "/features",
        json!({"name": "standard", "product_id": product["id"], "config_id": config["id"]}),
    )
    .await;
    call(
        &app,
        "PUT",
        &format!("/features/{}/update_inventory", feature["id"]),
        json!({"total": 10, "used": 0}),
    )
    .await;
    call(&app, "PUT", &format!("/features/{}", feature["id"]), json!({"reserved": 1})).await;

    let (_, job_a) = call(
        &app,
        "POST",
        "/jobs",
        json!({"slurm_job_id": 1, "cluster_id": cluster["id"], "username": "alice", "lead_host": "n01"}),
    )
    .await;
    let (_, job_b) = call(
        &app,
        "POST",
        "/jobs",
        json!({"slurm_job_id": 2, "cluster_id": cluster["id"], "username": "bob", "lead_host": "n02"}),
    )
    .await;

    let (status_a, _) = call(
        &app,
        "POST",
        "/bookings",
        json!({"job_id": job_a["id"], "feature_id": feature["id"], "quantity": 5}),
    )
    .await;
    let (status_b, _) = call(
        &app,
        "POST",
        "/bookings",
        json!({"job_id": job_b["id"], "feature_id": feature["id"], "quantity": 5}),
    )
    .await;

    let statuses = [status_a, status_b];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 1);

    let (_, bookings) = call(&app, "GET", "/bookings", Value::Null).await;
    let quantities: Vec<i64> = bookings.as_array().unwrap().iter().map(|b| b["quantity"].as_i64().unwrap()).collect();
    assert_eq!(quantities, vec![5]);
}

#[tokio::test]
async fn reconcile_patch_updates_inventory_totals() {
    let app = test_app(claims_with_scopes(
        "cluster-a",
        &[Scope::ClusterEdit, Scope::ConfigEdit, Scope::ProductEdit, Scope::FeatureEdit, Scope::Reconcile],
    ));

    let (_, cluster) = call(&app, "POST", "/clusters", json!({"name": "c1", "client_id": "cluster-a"})).await;
    let (_, config) = call(
        &app,
        "POST",
        "/configurations",
        json!({"name": "cfg1", "cluster_id": cluster["id"], "type": "flexlm", "grace_time": 0}),
    )
    .await;
    let (_, product) = call(&app, "POST", "/products", json!({"name": "p"})).await;
    let (_, feature) = call(
        &app,
        "POST",
        "/features",
        json!({"name": "X", "product_id": product["id"], "config_id": config["id"]}),
    )
    .await;
    assert_eq!(feature["inventory"]["total"], 0);

    let (status, result) = call(
        &app,
        "PATCH",
        "/reconcile",
        json!([{"product_feature": "p.X", "used": 3, "total": 10}]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["updated"], 1);

    let (_, updated) = call(&app, "GET", &format!("/features/{}", feature["id"]), Value::Null).await;
    assert_eq!(updated["inventory"]["total"], 10);
    assert_eq!(updated["inventory"]["used"], 3);
}

#[tokio::test]
async fn reconciling_the_same_report_twice_is_idempotent() {
    let app = test_app(claims_with_scopes(
        "cluster-a",
        &[Scope::ConfigEdit, Scope::ClusterEdit, Scope::ProductEdit, Scope::FeatureEdit, Scope::Reconcile],
    ));
    let (_, cluster) = call(&app, "POST", "/clusters", json!({"name": "c1", "client_id": "cluster-a"})).await;
    let (_, config) = call(
        &app,
        "POST",
        "/configurations",
        json!({"name": "cfg1", "cluster_id": cluster["id"], "type": "flexlm"}),
    )
    .await;
    let (_, product) = call(&app, "POST", "/products", json!({"name": "p"})).await;
    call(&app, "POST", "/features", json!({"name": "X", "product_id": product["id"], "config_id": config["id"]})).await;

    let report = json!([{"product_feature": "p.X", "used": 3, "total": 10}]);
    call(&app, "PATCH", "/reconcile", report.clone()).await;
    let (_, second) = call(&app, "PATCH", "/reconcile", report).await;
    assert_eq!(second["updated"], 1);

    let (_, features) = call(&app, "GET", "/features", Value::Null).await;
    let id = features[0]["id"].clone();
    let (_, view) = call(&app, "GET", &format!("/features/{id}"), Value::Null).await;
    assert_eq!(view["inventory"]["total"], 10);
    assert_eq!(view["inventory"]["used"], 3);
}

#[tokio::test]
async fn creating_then_deleting_a_feature_leaves_no_orphan_inventory() {
    let app = test_app(claims_with_scopes(
        "cluster-a",
        &[Scope::ClusterEdit, Scope::ConfigEdit, Scope::ProductEdit, Scope::FeatureEdit, Scope::FeatureView],
    ));
    let (_, cluster) = call(&app, "POST", "/clusters", json!({"name": "c1", "client_id": "cluster-a"})).await;
    let (_, config) = call(
        &app,
        "POST",
        "/configurations",
        json!({"name": "cfg1", "cluster_id": cluster["id"], "type": "flexlm"}),
    )
    .await;
    let (_, product) = call(&app, "POST", "/products", json!({"name": "p"})).await;
    let (_, feature) = call(
        &app,
        "POST",
        "/features",
        json!({"name": "X", "product_id": product["id"], "config_id": config["id"]}),
    )
    .await;

    let (status, _) = call(&app, "DELETE", &format!("/features/{}", feature["id"]), Value::Null).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "GET", &format!("/features/{}", feature["id"]), Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn by_client_id_with_unknown_azp_returns_empty_list_not_an_error() {
    let app = test_app(claims_with_scopes("unknown-cluster", &[Scope::ConfigView]));
    let (status, body) = call(&app, "GET", "/configurations/by_client_id", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn reported_used_above_total_is_clamped_to_total() {
    let app = test_app(claims_with_scopes(
        "cluster-a",
        &[Scope::ClusterEdit, Scope::ConfigEdit, Scope::ProductEdit, Scope::FeatureEdit, Scope::Reconcile],
    ));
    let (_, cluster) = call(&app, "POST", "/clusters", json!({"name": "c1", "client_id": "cluster-a"})).await;
    let (_, config) = call(
        &app,
        "POST",
        "/configurations",
        json!({"name": "cfg1", "cluster_id": cluster["id"], "type": "flexlm"}),
    )
    .await;
    let (_, product) = call(&app, "POST", "/products", json!({"name": "p"})).await;
    let (_, feature) = call(&app, "POST", "/features", json!({"name": "X", "product_id": product["id"], "config_id": config["id"]})).await;

    call(&app, "PATCH", "/reconcile", json!([{"product_feature": "p.X", "used": 99, "total": 10}])).await;

    let (_, view) = call(&app, "GET", &format!("/features/{}", feature["id"]), Value::Null).await;
    assert_eq!(view["inventory"]["used"], 10);
}

#[tokio::test]
async fn missing_scope_is_rejected_with_forbidden() {
    let app = test_app(claims_with_scopes("cluster-a", &[]));
    let (status, _) = call(&app, "GET", "/clusters", Value::Null).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_bearer_token_is_rejected_with_unauthorized() {
    let validator = StaticTokenValidator::new();
    let state = AppState { store: Arc::new(Store::new()), validator: Arc::new(validator) };
    let app = router(state);
    let request = Request::builder().method("GET").uri("/clusters").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

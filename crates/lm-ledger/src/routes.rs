//! HTTP surface: one handler family per entity plus the specialized endpoints from
//! spec.md §4.5, wired onto `axum::Router` the way the teacher's `querymt-service`
//! builds its routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use lm_types::auth::{IdentityClaims, Scope};
use lm_types::entities::*;
use lm_types::error::LedgerError;
use lm_types::wire::{BookingCreateRequest, ReconcileItem, ReconcileResult};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::auth::TokenValidator;
use crate::http_error::ApiError;
use crate::store::{ListQuery, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub validator: Arc<dyn TokenValidator>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_ascending: Option<bool>,
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        ListQuery {
            search: params.search,
            sort_field: params.sort_field,
            sort_ascending: params.sort_ascending.unwrap_or(true),
        }
    }
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    scope: Scope,
) -> Result<IdentityClaims, ApiError> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(LedgerError::Unauthorized)?;
    let claims = state.validator.validate(bearer).await?;
    if !claims.has_scope(scope.as_str()) {
        return Err(LedgerError::Forbidden(scope.as_str()).into());
    }
    Ok(claims)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/clusters", post(create_cluster).get(list_clusters))
        .route("/clusters/by_client_id", get(cluster_by_client_id))
        .route("/clusters/:id", get(get_cluster).put(update_cluster).delete(delete_cluster))
        .route(
            "/configurations",
            post(create_configuration).get(list_configurations),
        )
        .route("/configurations/by_client_id", get(configurations_by_client_id))
        .route(
            "/configurations/:id",
            get(get_configuration).put(update_configuration).delete(delete_configuration),
        )
        .route(
            "/license-servers",
            post(create_license_server).get(list_license_servers),
        )
        .route(
            "/license-servers/:id",
            get(get_license_server).put(update_license_server).delete(delete_license_server),
        )
        .route("/products", post(create_product).get(list_products))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/features", post(create_feature).get(list_features))
        .route("/features/:id", get(get_feature).put(update_feature).delete(delete_feature))
        .route("/features/:id/update_inventory", put(update_inventory))
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job).put(update_job).delete(delete_job))
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/admit", post(admit_job_bookings))
        .route("/bookings/:id", get(get_booking).delete(delete_booking))
        .route("/bookings/by_job/:slurm_job_id", delete(delete_bookings_by_job))
        .route("/reconcile", patch(reconcile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- Clusters ------------------------------------------------------------

async fn create_cluster(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ClusterCreate>,
) -> Result<(StatusCode, Json<Cluster>), ApiError> {
    authorize(&state, &headers, Scope::ClusterEdit).await?;
    let cluster = state.store.create_cluster(input).await?;
    Ok((StatusCode::CREATED, Json(cluster)))
}

async fn list_clusters(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Cluster>>, ApiError> {
    authorize(&state, &headers, Scope::ClusterView).await?;
    Ok(Json(state.store.list_clusters(&params.into()).await))
}

async fn get_cluster(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ClusterView>, ApiError> {
    authorize(&state, &headers, Scope::ClusterView).await?;
    Ok(Json(state.store.get_cluster_view(id).await?))
}

/// Returns the eager-loaded cluster the authenticated token's `azp` claim names — the
/// single request an agent's reconciliation cycle uses to read its own configurations,
/// features, inventories and running jobs' bookings (spec.md §4.3).
async fn cluster_by_client_id(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ClusterView>, ApiError> {
    let claims = authorize(&state, &headers, Scope::ClusterView).await?;
    state
        .store
        .cluster_view_by_client_id(&claims.azp)
        .await
        .map(Json)
        .ok_or_else(|| LedgerError::Unauthorized.into())
}

async fn update_cluster(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ClusterUpdate>,
) -> Result<Json<Cluster>, ApiError> {
    authorize(&state, &headers, Scope::ClusterEdit).await?;
    Ok(Json(state.store.update_cluster(id, patch).await?))
}

async fn delete_cluster(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::ClusterEdit).await?;
    state.store.delete_cluster(id).await?;
    Ok(StatusCode::OK)
}

// --- Configurations --------------------------------------------------------

async fn create_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ConfigurationCreate>,
) -> Result<(StatusCode, Json<Configuration>), ApiError> {
    authorize(&state, &headers, Scope::ConfigEdit).await?;
    let config = state.store.create_configuration(input).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

async fn list_configurations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Configuration>>, ApiError> {
    authorize(&state, &headers, Scope::ConfigView).await?;
    Ok(Json(state.store.list_configurations(&params.into()).await))
}

/// Returns the configurations for the cluster whose `client_id` matches the
/// authenticated token's `azp` claim; empty list if no match (spec.md §4.5, §8).
async fn configurations_by_client_id(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Configuration>>, ApiError> {
    let claims = authorize(&state, &headers, Scope::ConfigView).await?;
    Ok(Json(state.store.configurations_by_client_id(&claims.azp).await))
}

async fn get_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Configuration>, ApiError> {
    authorize(&state, &headers, Scope::ConfigView).await?;
    Ok(Json(state.store.get_configuration(id).await?))
}

async fn update_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ConfigurationUpdate>,
) -> Result<Json<Configuration>, ApiError> {
    authorize(&state, &headers, Scope::ConfigEdit).await?;
    Ok(Json(state.store.update_configuration(id, patch).await?))
}

async fn delete_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::ConfigEdit).await?;
    state.store.delete_configuration(id).await?;
    Ok(StatusCode::OK)
}

// --- License servers -----------------------------------------------------

async fn create_license_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LicenseServerCreate>,
) -> Result<(StatusCode, Json<LicenseServer>), ApiError> {
    authorize(&state, &headers, Scope::LicenseServerEdit).await?;
    let server = state.store.create_license_server(input).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

async fn list_license_servers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<LicenseServer>>, ApiError> {
    authorize(&state, &headers, Scope::LicenseServerView).await?;
    Ok(Json(state.store.list_license_servers(&params.into()).await))
}

async fn get_license_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<LicenseServer>, ApiError> {
    authorize(&state, &headers, Scope::LicenseServerView).await?;
    Ok(Json(state.store.get_license_server(id).await?))
}

async fn update_license_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<LicenseServerUpdate>,
) -> Result<Json<LicenseServer>, ApiError> {
    authorize(&state, &headers, Scope::LicenseServerEdit).await?;
    Ok(Json(state.store.update_license_server(id, patch).await?))
}

async fn delete_license_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::LicenseServerEdit).await?;
    state.store.delete_license_server(id).await?;
    Ok(StatusCode::OK)
}

// --- Products --------------------------------------------------------------

async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ProductCreate>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    authorize(&state, &headers, Scope::ProductEdit).await?;
    let product = state.store.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    authorize(&state, &headers, Scope::ProductView).await?;
    Ok(Json(state.store.list_products(&params.into()).await))
}

async fn get_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    authorize(&state, &headers, Scope::ProductView).await?;
    Ok(Json(state.store.get_product(id).await?))
}

async fn update_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<ProductUpdate>,
) -> Result<Json<Product>, ApiError> {
    authorize(&state, &headers, Scope::ProductEdit).await?;
    Ok(Json(state.store.update_product(id, patch).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::ProductEdit).await?;
    state.store.delete_product(id).await?;
    Ok(StatusCode::OK)
}

// --- Features + inventory ---------------------------------------------------

async fn create_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<FeatureCreate>,
) -> Result<(StatusCode, Json<FeatureView>), ApiError> {
    authorize(&state, &headers, Scope::FeatureEdit).await?;
    let feature = state.store.create_feature(input).await?;
    Ok((StatusCode::CREATED, Json(feature)))
}

async fn list_features(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Feature>>, ApiError> {
    authorize(&state, &headers, Scope::FeatureView).await?;
    Ok(Json(state.store.list_features(&params.into()).await))
}

async fn get_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<FeatureView>, ApiError> {
    authorize(&state, &headers, Scope::FeatureView).await?;
    Ok(Json(state.store.get_feature(id).await?))
}

async fn update_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<FeatureUpdate>,
) -> Result<Json<FeatureView>, ApiError> {
    authorize(&state, &headers, Scope::FeatureEdit).await?;
    Ok(Json(state.store.update_feature(id, patch).await?))
}

async fn delete_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::FeatureEdit).await?;
    state.store.delete_feature(id).await?;
    Ok(StatusCode::OK)
}

/// Operator-facing direct inventory override (spec.md §4.5).
async fn update_inventory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<InventoryUpdate>,
) -> Result<Json<FeatureView>, ApiError> {
    authorize(&state, &headers, Scope::FeatureEdit).await?;
    Ok(Json(state.store.update_inventory(id, patch).await?))
}

// --- Jobs --------------------------------------------------------------------

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<JobCreate>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    authorize(&state, &headers, Scope::JobEdit).await?;
    let job = state.store.create_job(input).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Job>>, ApiError> {
    authorize(&state, &headers, Scope::JobView).await?;
    Ok(Json(state.store.list_jobs(&params.into()).await))
}

async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    authorize(&state, &headers, Scope::JobView).await?;
    Ok(Json(state.store.get_job(id).await?))
}

async fn update_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<JobUpdate>,
) -> Result<Json<Job>, ApiError> {
    authorize(&state, &headers, Scope::JobEdit).await?;
    Ok(Json(state.store.update_job(id, patch).await?))
}

async fn delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::JobEdit).await?;
    state.store.delete_job(id).await?;
    Ok(StatusCode::OK)
}

// --- Bookings ------------------------------------------------------------------

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<BookingCreate>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    authorize(&state, &headers, Scope::BookingEdit).await?;
    let booking = state.store.create_booking(input).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    authorize(&state, &headers, Scope::BookingView).await?;
    Ok(Json(state.store.list_bookings(&params.into()).await))
}

async fn get_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, ApiError> {
    authorize(&state, &headers, Scope::BookingView).await?;
    Ok(Json(state.store.get_booking(id).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers, Scope::BookingEdit).await?;
    state.store.delete_booking(id).await?;
    Ok(StatusCode::OK)
}

/// The combined job-admission shape from spec.md §6 ("Booking create payload"): the
/// agent speaks `slurm_job_id`/`product_feature`, not internal ids, and the cluster is
/// inferred from the token's `azp` claim the same way `by_client_id` resolves it.
async fn admit_job_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BookingCreateRequest>,
) -> Result<(StatusCode, Json<Vec<Booking>>), ApiError> {
    let claims = authorize(&state, &headers, Scope::BookingEdit).await?;
    let Some(cluster) = state.store.list_clusters(&Default::default()).await.into_iter().find(|c| c.client_id == claims.azp) else {
        return Err(LedgerError::Unauthorized.into());
    };
    let bookings = state
        .store
        .admit_job_bookings(cluster.id, body.slurm_job_id, body.user_name, body.lead_host, body.bookings)
        .await?;
    Ok((StatusCode::CREATED, Json(bookings)))
}

/// Cluster-scoped cascade for job-end notifications (spec.md §4.5).
async fn delete_bookings_by_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slurm_job_id): Path<i64>,
) -> Result<Json<ReconcileResult>, ApiError> {
    let claims = authorize(&state, &headers, Scope::BookingEdit).await?;
    let Some(cluster) = state.store.list_clusters(&Default::default()).await.into_iter().find(|c| c.client_id == claims.azp) else {
        return Ok(Json(ReconcileResult { updated: 0 }));
    };
    let removed = state.store.delete_bookings_by_slurm_job_id(cluster.id, slurm_job_id).await?;
    Ok(Json(ReconcileResult { updated: removed }))
}

// --- Reconcile -------------------------------------------------------------------

async fn reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(items): Json<Vec<ReconcileItem>>,
) -> Result<Json<ReconcileResult>, ApiError> {
    authorize(&state, &headers, Scope::Reconcile).await?;
    let (updated, warnings) = state.store.reconcile(items).await;
    for warning in warnings {
        tracing::warn!(%warning, "reconcile");
    }
    Ok(Json(ReconcileResult { updated }))
}

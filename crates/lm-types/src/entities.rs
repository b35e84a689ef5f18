use serde::{Deserialize, Serialize};

/// The upstream license-server technology a `Configuration` speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationType {
    Flexlm,
    Rlm,
    Lsdyna,
    Lmx,
    Olicense,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCreate {
    pub name: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterUpdate {
    pub name: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    pub id: i64,
    pub name: String,
    pub cluster_id: i64,
    #[serde(rename = "type")]
    pub kind: ConfigurationType,
    pub grace_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationCreate {
    pub name: String,
    pub cluster_id: i64,
    #[serde(rename = "type")]
    pub kind: ConfigurationType,
    #[serde(default)]
    pub grace_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationUpdate {
    pub name: Option<String>,
    pub cluster_id: Option<i64>,
    #[serde(rename = "type", default)]
    pub kind: Option<ConfigurationType>,
    pub grace_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LicenseServer {
    pub id: i64,
    pub config_id: i64,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseServerCreate {
    pub config_id: i64,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseServerUpdate {
    pub config_id: Option<i64>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductUpdate {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    pub id: i64,
    pub feature_id: i64,
    pub total: i64,
    pub used: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryUpdate {
    pub total: Option<i64>,
    pub used: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub product_id: i64,
    pub config_id: i64,
    pub reserved: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCreate {
    pub name: String,
    pub product_id: i64,
    pub config_id: i64,
    #[serde(default)]
    pub reserved: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureUpdate {
    pub name: Option<String>,
    pub product_id: Option<i64>,
    pub config_id: Option<i64>,
    pub reserved: Option<i64>,
}

/// `GET /features/{id}` eager-loads the product name and current inventory,
/// mirroring `FeatureSchema` in `backend/lm_backend/api/schemas/feature.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureView {
    pub id: i64,
    pub name: String,
    pub product: Product,
    pub config_id: i64,
    pub reserved: i64,
    pub inventory: Option<Inventory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub slurm_job_id: i64,
    pub cluster_id: i64,
    pub username: String,
    pub lead_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreate {
    pub slurm_job_id: i64,
    pub cluster_id: i64,
    pub username: String,
    pub lead_host: String,
}

/// `slurm_job_id`/`cluster_id` form the unique key and are immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobUpdate {
    pub username: Option<String>,
    pub lead_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: i64,
    pub job_id: i64,
    pub feature_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCreate {
    pub job_id: i64,
    pub feature_id: i64,
    pub quantity: i64,
}

/// `GET /configurations/{id}` and the nested view under `ClusterView` eager-load the
/// license servers and features a configuration owns, mirroring
/// `original_source/agent/lm_agent/backend_utils/models.py`'s `ConfigurationSchema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationView {
    pub id: i64,
    pub name: String,
    pub cluster_id: i64,
    #[serde(rename = "type")]
    pub kind: ConfigurationType,
    pub grace_time: i64,
    pub license_servers: Vec<LicenseServer>,
    pub features: Vec<FeatureView>,
}

/// A job with its bookings eager-loaded, mirroring `JobSchema` in the same module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: i64,
    pub slurm_job_id: i64,
    pub cluster_id: i64,
    pub username: String,
    pub lead_host: String,
    pub bookings: Vec<Booking>,
}

/// `GET /clusters/{id}` and `GET /clusters/by_client_id` eager-load every configuration
/// (with its features, inventories and license servers) and every job (with its
/// bookings) so the agent can assemble one reconciliation cycle's worth of state from a
/// single request, the way the original agent read a nested `ClusterSchema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: i64,
    pub name: String,
    pub client_id: String,
    pub configurations: Vec<ConfigurationView>,
    pub jobs: Vec<JobView>,
}

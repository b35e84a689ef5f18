//! In-memory reference implementation of the ledger's persisted state.
//!
//! A single `tokio::sync::RwLock<LedgerState>` guards every table. This is the whole-state
//! lock simplification recorded as an Open Question in DESIGN.md: admission takes the
//! write lock for its read-modify-write, which gives the same serialization-per-feature
//! guarantee spec.md §5 asks for, just at coarser granularity than a row lock.

use std::collections::HashMap;

use lm_types::entities::*;
use lm_types::error::LedgerError;
use lm_types::wire::{LicenseBookingItem, ReconcileItem};
use lm_types::ProductFeature;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct LedgerState {
    pub clusters: HashMap<i64, Cluster>,
    pub configurations: HashMap<i64, Configuration>,
    pub license_servers: HashMap<i64, LicenseServer>,
    pub products: HashMap<i64, Product>,
    pub features: HashMap<i64, Feature>,
    /// Keyed by `feature_id`: the unique-per-feature invariant makes this the natural key.
    /// `Inventory::id` is set equal to its feature's id (a 1:1 relation has no independent
    /// identity worth minting).
    pub inventories: HashMap<i64, Inventory>,
    pub jobs: HashMap<i64, Job>,
    pub bookings: HashMap<i64, Booking>,
    next_id: i64,
}

impl LedgerState {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn booked_quantity(&self, feature_id: i64) -> i64 {
        self.bookings
            .values()
            .filter(|b| b.feature_id == feature_id)
            .map(|b| b.quantity)
            .sum()
    }

    fn find_product_by_name(&self, name: &str) -> Option<&Product> {
        self.products.values().find(|p| p.name == name)
    }

    fn find_feature_by_product_feature(&self, pf: &ProductFeature) -> Option<&Feature> {
        let product = self.find_product_by_name(pf.product())?;
        self.features
            .values()
            .find(|f| f.product_id == product.id && f.name == pf.feature())
    }
}

#[derive(Debug, Default)]
pub struct Store {
    state: RwLock<LedgerState>,
}

#[derive(Debug, Default, Clone)]
pub struct ListQuery {
    pub search: Option<String>,
    pub sort_field: Option<String>,
    pub sort_ascending: bool,
}

/// Entities expose their searchable/sortable surface through this trait so list
/// endpoints share one filtering/sorting routine instead of repeating it per entity
/// (spec.md §9's "generic CRUD" note, applied to the read path).
pub trait Listable {
    fn matches_search(&self, needle: &str) -> bool;
    fn sort_key(&self, field: &str) -> String;
}

pub fn apply_list_query<T: Listable + Clone>(mut items: Vec<T>, query: &ListQuery) -> Vec<T> {
    if let Some(needle) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        items.retain(|item| item.matches_search(&needle));
    }
    if let Some(field) = &query.sort_field {
        items.sort_by(|a, b| a.sort_key(field).cmp(&b.sort_key(field)));
        if !query.sort_ascending {
            items.reverse();
        }
    }
    items
}

impl Listable for Cluster {
    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.client_id.to_lowercase().contains(needle)
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "client_id" => self.client_id.clone(),
            _ => self.name.clone(),
        }
    }
}

impl Listable for Configuration {
    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "grace_time" => format!("{:020}", self.grace_time),
            _ => self.name.clone(),
        }
    }
}

impl Listable for LicenseServer {
    fn matches_search(&self, needle: &str) -> bool {
        self.host.to_lowercase().contains(needle)
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "port" => format!("{:05}", self.port),
            _ => self.host.clone(),
        }
    }
}

impl Listable for Product {
    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
    fn sort_key(&self, _field: &str) -> String {
        self.name.clone()
    }
}

impl Listable for Feature {
    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "reserved" => format!("{:020}", self.reserved),
            _ => self.name.clone(),
        }
    }
}

impl Listable for Job {
    fn matches_search(&self, needle: &str) -> bool {
        self.username.to_lowercase().contains(needle) || self.lead_host.to_lowercase().contains(needle)
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "slurm_job_id" => format!("{:020}", self.slurm_job_id),
            _ => self.username.clone(),
        }
    }
}

impl Listable for Booking {
    fn matches_search(&self, _needle: &str) -> bool {
        false
    }
    fn sort_key(&self, field: &str) -> String {
        match field {
            "quantity" => format!("{:020}", self.quantity),
            _ => format!("{:020}", self.id),
        }
    }
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    // --- Clusters -------------------------------------------------------

    pub async fn create_cluster(&self, input: ClusterCreate) -> Result<Cluster, LedgerError> {
        let mut state = self.state.write().await;
        if state.clusters.values().any(|c| c.client_id == input.client_id) {
            return Err(LedgerError::Conflict(format!(
                "a cluster with client_id `{}` already exists",
                input.client_id
            )));
        }
        let id = state.alloc_id();
        let cluster = Cluster { id, name: input.name, client_id: input.client_id };
        state.clusters.insert(id, cluster.clone());
        Ok(cluster)
    }

    pub async fn get_cluster(&self, id: i64) -> Result<Cluster, LedgerError> {
        self.state
            .read()
            .await
            .clusters
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound { entity: "cluster", id })
    }

    /// Assembles the eager-loaded view a reconciliation cycle reads in one request:
    /// every configuration (with its license servers and features+inventory) and every
    /// job (with its bookings) belonging to the cluster.
    pub async fn get_cluster_view(&self, id: i64) -> Result<ClusterView, LedgerError> {
        let state = self.state.read().await;
        let cluster = state.clusters.get(&id).cloned().ok_or(LedgerError::NotFound { entity: "cluster", id })?;
        Ok(self.build_cluster_view(&state, cluster))
    }

    pub async fn cluster_view_by_client_id(&self, client_id: &str) -> Option<ClusterView> {
        let state = self.state.read().await;
        let cluster = state.clusters.values().find(|c| c.client_id == client_id).cloned()?;
        Some(self.build_cluster_view(&state, cluster))
    }

    fn build_cluster_view(&self, state: &LedgerState, cluster: Cluster) -> ClusterView {
        let configurations = state
            .configurations
            .values()
            .filter(|c| c.cluster_id == cluster.id)
            .cloned()
            .map(|config| {
                let license_servers =
                    state.license_servers.values().filter(|s| s.config_id == config.id).cloned().collect();
                let features = state
                    .features
                    .values()
                    .filter(|f| f.config_id == config.id)
                    .cloned()
                    .map(|feature| {
                        let product = state
                            .products
                            .get(&feature.product_id)
                            .cloned()
                            .unwrap_or(Product { id: feature.product_id, name: String::new() });
                        let inventory = state.inventories.get(&feature.id).cloned();
                        FeatureView {
                            id: feature.id,
                            name: feature.name,
                            product,
                            config_id: feature.config_id,
                            reserved: feature.reserved,
                            inventory,
                        }
                    })
                    .collect();
                ConfigurationView {
                    id: config.id,
                    name: config.name,
                    cluster_id: config.cluster_id,
                    kind: config.kind,
                    grace_time: config.grace_time,
                    license_servers,
                    features,
                }
            })
            .collect();

        let jobs = state
            .jobs
            .values()
            .filter(|j| j.cluster_id == cluster.id)
            .cloned()
            .map(|job| {
                let bookings = state.bookings.values().filter(|b| b.job_id == job.id).cloned().collect();
                JobView {
                    id: job.id,
                    slurm_job_id: job.slurm_job_id,
                    cluster_id: job.cluster_id,
                    username: job.username,
                    lead_host: job.lead_host,
                    bookings,
                }
            })
            .collect();

        ClusterView { id: cluster.id, name: cluster.name, client_id: cluster.client_id, configurations, jobs }
    }

    pub async fn list_clusters(&self, query: &ListQuery) -> Vec<Cluster> {
        let items: Vec<_> = self.state.read().await.clusters.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn update_cluster(&self, id: i64, patch: ClusterUpdate) -> Result<Cluster, LedgerError> {
        let mut state = self.state.write().await;
        if patch.name.is_none() && patch.client_id.is_none() {
            return Err(LedgerError::Validation {
                field: "body".into(),
                message: "update body must set at least one field".into(),
            });
        }
        if let Some(client_id) = &patch.client_id {
            if state.clusters.values().any(|c| c.id != id && &c.client_id == client_id) {
                return Err(LedgerError::Conflict(format!(
                    "a cluster with client_id `{client_id}` already exists"
                )));
            }
        }
        let cluster = state
            .clusters
            .get_mut(&id)
            .ok_or(LedgerError::NotFound { entity: "cluster", id })?;
        if let Some(name) = patch.name {
            cluster.name = name;
        }
        if let Some(client_id) = patch.client_id {
            cluster.client_id = client_id;
        }
        Ok(cluster.clone())
    }

    pub async fn delete_cluster(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state
            .clusters
            .remove(&id)
            .ok_or(LedgerError::NotFound { entity: "cluster", id })?;
        Ok(())
    }

    // --- Configurations ---------------------------------------------------

    pub async fn create_configuration(
        &self,
        input: ConfigurationCreate,
    ) -> Result<Configuration, LedgerError> {
        let mut state = self.state.write().await;
        if !state.clusters.contains_key(&input.cluster_id) {
            return Err(LedgerError::Validation {
                field: "cluster_id".into(),
                message: format!("no cluster with id {}", input.cluster_id),
            });
        }
        if input.grace_time < 0 {
            return Err(LedgerError::Validation {
                field: "grace_time".into(),
                message: "grace_time must be >= 0".into(),
            });
        }
        let id = state.alloc_id();
        let config = Configuration {
            id,
            name: input.name,
            cluster_id: input.cluster_id,
            kind: input.kind,
            grace_time: input.grace_time,
        };
        state.configurations.insert(id, config.clone());
        Ok(config)
    }

    pub async fn get_configuration(&self, id: i64) -> Result<Configuration, LedgerError> {
        self.state
            .read()
            .await
            .configurations
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound { entity: "configuration", id })
    }

    pub async fn list_configurations(&self, query: &ListQuery) -> Vec<Configuration> {
        let items: Vec<_> = self.state.read().await.configurations.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn configurations_by_client_id(&self, client_id: &str) -> Vec<Configuration> {
        let state = self.state.read().await;
        let Some(cluster) = state.clusters.values().find(|c| c.client_id == client_id) else {
            return Vec::new();
        };
        state
            .configurations
            .values()
            .filter(|c| c.cluster_id == cluster.id)
            .cloned()
            .collect()
    }

    pub async fn update_configuration(
        &self,
        id: i64,
        patch: ConfigurationUpdate,
    ) -> Result<Configuration, LedgerError> {
        let mut state = self.state.write().await;
        if patch.name.is_none()
            && patch.cluster_id.is_none()
            && patch.kind.is_none()
            && patch.grace_time.is_none()
        {
            return Err(LedgerError::Validation {
                field: "body".into(),
                message: "update body must set at least one field".into(),
            });
        }
        if let Some(cluster_id) = patch.cluster_id {
            if !state.clusters.contains_key(&cluster_id) {
                return Err(LedgerError::Validation {
                    field: "cluster_id".into(),
                    message: format!("no cluster with id {cluster_id}"),
                });
            }
        }
        let config = state
            .configurations
            .get_mut(&id)
            .ok_or(LedgerError::NotFound { entity: "configuration", id })?;
        if let Some(name) = patch.name {
            config.name = name;
        }
        if let Some(cluster_id) = patch.cluster_id {
            config.cluster_id = cluster_id;
        }
        if let Some(kind) = patch.kind {
            config.kind = kind;
        }
        if let Some(grace_time) = patch.grace_time {
            config.grace_time = grace_time;
        }
        Ok(config.clone())
    }

    pub async fn delete_configuration(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state
            .configurations
            .remove(&id)
            .ok_or(LedgerError::NotFound { entity: "configuration", id })?;
        Ok(())
    }

    // --- License servers --------------------------------------------------

    pub async fn create_license_server(
        &self,
        input: LicenseServerCreate,
    ) -> Result<LicenseServer, LedgerError> {
        let mut state = self.state.write().await;
        if !state.configurations.contains_key(&input.config_id) {
            return Err(LedgerError::Validation {
                field: "config_id".into(),
                message: format!("no configuration with id {}", input.config_id),
            });
        }
        if input.port == 0 {
            return Err(LedgerError::Validation {
                field: "port".into(),
                message: "port must be in range 1..65535".into(),
            });
        }
        let id = state.alloc_id();
        let server = LicenseServer { id, config_id: input.config_id, host: input.host, port: input.port };
        state.license_servers.insert(id, server.clone());
        Ok(server)
    }

    pub async fn get_license_server(&self, id: i64) -> Result<LicenseServer, LedgerError> {
        self.state
            .read()
            .await
            .license_servers
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound { entity: "license_server", id })
    }

    pub async fn list_license_servers(&self, query: &ListQuery) -> Vec<LicenseServer> {
        let items: Vec<_> = self.state.read().await.license_servers.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn update_license_server(
        &self,
        id: i64,
        patch: LicenseServerUpdate,
    ) -> Result<LicenseServer, LedgerError> {
        let mut state = self.state.write().await;
        if patch.config_id.is_none() && patch.host.is_none() && patch.port.is_none() {
            return Err(LedgerError::Validation {
                field: "body".into(),
                message: "update body must set at least one field".into(),
            });
        }
        if let Some(port) = patch.port {
            if port == 0 {
                return Err(LedgerError::Validation {
                    field: "port".into(),
                    message: "port must be in range 1..65535".into(),
                });
            }
        }
        let server = state
            .license_servers
            .get_mut(&id)
            .ok_or(LedgerError::NotFound { entity: "license_server", id })?;
        if let Some(config_id) = patch.config_id {
            server.config_id = config_id;
        }
        if let Some(host) = patch.host {
            server.host = host;
        }
        if let Some(port) = patch.port {
            server.port = port;
        }
        Ok(server.clone())
    }

    pub async fn delete_license_server(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state
            .license_servers
            .remove(&id)
            .ok_or(LedgerError::NotFound { entity: "license_server", id })?;
        Ok(())
    }

    // --- Products ----------------------------------------------------------

    pub async fn create_product(&self, input: ProductCreate) -> Result<Product, LedgerError> {
        let mut state = self.state.write().await;
        if state.find_product_by_name(&input.name).is_some() {
            return Err(LedgerError::Conflict(format!("product `{}` already exists", input.name)));
        }
        let id = state.alloc_id();
        let product = Product { id, name: input.name };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, LedgerError> {
        self.state
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound { entity: "product", id })
    }

    pub async fn list_products(&self, query: &ListQuery) -> Vec<Product> {
        let items: Vec<_> = self.state.read().await.products.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn update_product(&self, id: i64, patch: ProductUpdate) -> Result<Product, LedgerError> {
        let mut state = self.state.write().await;
        let Some(name) = patch.name else {
            return Err(LedgerError::Validation {
                field: "body".into(),
                message: "update body must set at least one field".into(),
            });
        };
        if state.products.values().any(|p| p.id != id && p.name == name) {
            return Err(LedgerError::Conflict(format!("product `{name}` already exists")));
        }
        let product = state.products.get_mut(&id).ok_or(LedgerError::NotFound { entity: "product", id })?;
        product.name = name;
        Ok(product.clone())
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state
            .products
            .remove(&id)
            .ok_or(LedgerError::NotFound { entity: "product", id })?;
        Ok(())
    }

    // --- Features + inventory ----------------------------------------------

    pub async fn create_feature(&self, input: FeatureCreate) -> Result<FeatureView, LedgerError> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&input.product_id) {
            return Err(LedgerError::Validation {
                field: "product_id".into(),
                message: format!("no product with id {}", input.product_id),
            });
        }
        if !state.configurations.contains_key(&input.config_id) {
            return Err(LedgerError::Validation {
                field: "config_id".into(),
                message: format!("no configuration with id {}", input.config_id),
            });
        }
        if state
            .features
            .values()
            .any(|f| f.product_id == input.product_id && f.config_id == input.config_id && f.name == input.name)
        {
            return Err(LedgerError::Conflict(format!(
                "feature `{}` already exists for this product/configuration",
                input.name
            )));
        }
        if input.reserved > 0 {
            return Err(LedgerError::Validation {
                field: "reserved".into(),
                message: "reserved cannot exceed inventory.total".into(),
            });
        }
        let id = state.alloc_id();
        let feature = Feature {
            id,
            name: input.name,
            product_id: input.product_id,
            config_id: input.config_id,
            reserved: input.reserved,
        };
        let inventory = Inventory { id, feature_id: id, total: 0, used: 0 };
        state.features.insert(id, feature.clone());
        state.inventories.insert(id, inventory.clone());
        let product = state.products.get(&feature.product_id).cloned().expect("checked above");
        Ok(FeatureView {
            id: feature.id,
            name: feature.name,
            product,
            config_id: feature.config_id,
            reserved: feature.reserved,
            inventory: Some(inventory),
        })
    }

    pub async fn get_feature(&self, id: i64) -> Result<FeatureView, LedgerError> {
        let state = self.state.read().await;
        let feature = state.features.get(&id).cloned().ok_or(LedgerError::NotFound { entity: "feature", id })?;
        let product = state.products.get(&feature.product_id).cloned().ok_or(LedgerError::NotFound {
            entity: "product",
            id: feature.product_id,
        })?;
        let inventory = state.inventories.get(&id).cloned();
        Ok(FeatureView {
            id: feature.id,
            name: feature.name,
            product,
            config_id: feature.config_id,
            reserved: feature.reserved,
            inventory,
        })
    }

    pub async fn list_features(&self, query: &ListQuery) -> Vec<Feature> {
        let items: Vec<_> = self.state.read().await.features.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn update_feature(&self, id: i64, patch: FeatureUpdate) -> Result<FeatureView, LedgerError> {
        {
            let mut state = self.state.write().await;
            if patch.name.is_none()
                && patch.product_id.is_none()
                && patch.config_id.is_none()
                && patch.reserved.is_none()
            {
                return Err(LedgerError::Validation {
                    field: "body".into(),
                    message: "update body must set at least one field".into(),
                });
            }
            if let Some(reserved) = patch.reserved {
                let inventory_total = state.inventories.get(&id).map(|inv| inv.total).unwrap_or(0);
                if reserved > inventory_total {
                    return Err(LedgerError::Validation {
                        field: "reserved".into(),
                        message: "reserved cannot exceed inventory.total".into(),
                    });
                }
            }
            let feature = state
                .features
                .get_mut(&id)
                .ok_or(LedgerError::NotFound { entity: "feature", id })?;
            if let Some(name) = patch.name {
                feature.name = name;
            }
            if let Some(product_id) = patch.product_id {
                feature.product_id = product_id;
            }
            if let Some(config_id) = patch.config_id {
                feature.config_id = config_id;
            }
            if let Some(reserved) = patch.reserved {
                feature.reserved = reserved;
            }
        }
        self.get_feature(id).await
    }

    pub async fn delete_feature(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state
            .features
            .remove(&id)
            .ok_or(LedgerError::NotFound { entity: "feature", id })?;
        state.inventories.remove(&id);
        state.bookings.retain(|_, b| b.feature_id != id);
        Ok(())
    }

    pub async fn update_inventory(&self, feature_id: i64, patch: InventoryUpdate) -> Result<FeatureView, LedgerError> {
        {
            let mut state = self.state.write().await;
            if !state.features.contains_key(&feature_id) {
                return Err(LedgerError::NotFound { entity: "feature", id: feature_id });
            }
            let inventory = state
                .inventories
                .get_mut(&feature_id)
                .ok_or(LedgerError::NotFound { entity: "inventory", id: feature_id })?;
            if let Some(total) = patch.total {
                inventory.total = total;
            }
            if let Some(used) = patch.used {
                inventory.used = used.min(inventory.total).max(0);
            }
        }
        self.get_feature(feature_id).await
    }

    // --- Jobs ----------------------------------------------------------------

    pub async fn create_job(&self, input: JobCreate) -> Result<Job, LedgerError> {
        let mut state = self.state.write().await;
        if !state.clusters.contains_key(&input.cluster_id) {
            return Err(LedgerError::Validation {
                field: "cluster_id".into(),
                message: format!("no cluster with id {}", input.cluster_id),
            });
        }
        if state
            .jobs
            .values()
            .any(|j| j.slurm_job_id == input.slurm_job_id && j.cluster_id == input.cluster_id)
        {
            return Err(LedgerError::Conflict(format!(
                "job {} already exists on this cluster",
                input.slurm_job_id
            )));
        }
        let id = state.alloc_id();
        let job = Job {
            id,
            slurm_job_id: input.slurm_job_id,
            cluster_id: input.cluster_id,
            username: input.username,
            lead_host: input.lead_host,
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    pub async fn get_job(&self, id: i64) -> Result<Job, LedgerError> {
        self.state.read().await.jobs.get(&id).cloned().ok_or(LedgerError::NotFound { entity: "job", id })
    }

    pub async fn list_jobs(&self, query: &ListQuery) -> Vec<Job> {
        let items: Vec<_> = self.state.read().await.jobs.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn update_job(&self, id: i64, patch: JobUpdate) -> Result<Job, LedgerError> {
        let mut state = self.state.write().await;
        if patch.username.is_none() && patch.lead_host.is_none() {
            return Err(LedgerError::Validation {
                field: "body".into(),
                message: "update body must set at least one field".into(),
            });
        }
        let job = state.jobs.get_mut(&id).ok_or(LedgerError::NotFound { entity: "job", id })?;
        if let Some(username) = patch.username {
            job.username = username;
        }
        if let Some(lead_host) = patch.lead_host {
            job.lead_host = lead_host;
        }
        Ok(job.clone())
    }

    pub async fn delete_job(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.jobs.remove(&id).ok_or(LedgerError::NotFound { entity: "job", id })?;
        state.bookings.retain(|_, b| b.job_id != id);
        Ok(())
    }

    // --- Bookings --------------------------------------------------------------

    pub async fn create_booking(&self, input: BookingCreate) -> Result<Booking, LedgerError> {
        let mut state = self.state.write().await;
        if input.quantity <= 0 {
            return Err(LedgerError::Validation {
                field: "quantity".into(),
                message: "quantity must be > 0".into(),
            });
        }
        if !state.jobs.contains_key(&input.job_id) {
            return Err(LedgerError::Validation {
                field: "job_id".into(),
                message: format!("no job with id {}", input.job_id),
            });
        }
        let inventory = state
            .inventories
            .get(&input.feature_id)
            .cloned()
            .ok_or(LedgerError::Validation {
                field: "feature_id".into(),
                message: format!("no feature with id {}", input.feature_id),
            })?;
        let feature = state.features.get(&input.feature_id).cloned().expect("inventory implies feature");
        let already_booked = state.booked_quantity(input.feature_id);
        let projected = inventory.used + already_booked + feature.reserved + input.quantity;
        if projected > inventory.total {
            return Err(LedgerError::Conflict(format!(
                "admitting {} more of feature {} would exceed total capacity ({} > {})",
                input.quantity, input.feature_id, projected, inventory.total
            )));
        }
        let id = state.alloc_id();
        let booking = Booking { id, job_id: input.job_id, feature_id: input.feature_id, quantity: input.quantity };
        state.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    pub async fn get_booking(&self, id: i64) -> Result<Booking, LedgerError> {
        self.state.read().await.bookings.get(&id).cloned().ok_or(LedgerError::NotFound { entity: "booking", id })
    }

    pub async fn list_bookings(&self, query: &ListQuery) -> Vec<Booking> {
        let items: Vec<_> = self.state.read().await.bookings.values().cloned().collect();
        apply_list_query(items, query)
    }

    pub async fn delete_booking(&self, id: i64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.bookings.remove(&id).ok_or(LedgerError::NotFound { entity: "booking", id })?;
        Ok(())
    }

    pub async fn list_bookings_for_job(&self, job_id: i64) -> Vec<Booking> {
        self.state.read().await.bookings.values().filter(|b| b.job_id == job_id).cloned().collect()
    }

    /// Cluster-scoped cascade used by `DELETE /bookings/by_job/{slurm_job_id}`.
    pub async fn delete_bookings_by_slurm_job_id(&self, cluster_id: i64, slurm_job_id: i64) -> Result<usize, LedgerError> {
        let mut state = self.state.write().await;
        let Some(job) = state
            .jobs
            .values()
            .find(|j| j.slurm_job_id == slurm_job_id && j.cluster_id == cluster_id)
            .cloned()
        else {
            return Ok(0);
        };
        let before = state.bookings.len();
        state.bookings.retain(|_, b| b.job_id != job.id);
        Ok(before - state.bookings.len())
    }

    /// Resolves `job_id`/`feature_id` via the natural keys the agent speaks
    /// (`slurm_job_id`, `product_feature`) and admits each requested booking,
    /// creating the Job row on first sight. Used by the agent's admission call.
    pub async fn admit_job_bookings(
        &self,
        cluster_id: i64,
        slurm_job_id: i64,
        user_name: String,
        lead_host: String,
        items: Vec<LicenseBookingItem>,
    ) -> Result<Vec<Booking>, LedgerError> {
        let job_id = {
            let mut state = self.state.write().await;
            if let Some(job) = state
                .jobs
                .values()
                .find(|j| j.slurm_job_id == slurm_job_id && j.cluster_id == cluster_id)
            {
                job.id
            } else {
                let id = state.alloc_id();
                state.jobs.insert(
                    id,
                    Job { id, slurm_job_id, cluster_id, username: user_name, lead_host },
                );
                id
            }
        };

        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let feature_id = {
                let state = self.state.read().await;
                state
                    .find_feature_by_product_feature(&item.product_feature)
                    .map(|f| f.id)
                    .ok_or_else(|| LedgerError::Validation {
                        field: "product_feature".into(),
                        message: format!("unknown feature `{}`", item.product_feature),
                    })?
            };
            let booking = self
                .create_booking(BookingCreate { job_id, feature_id, quantity: item.quantity })
                .await?;
            created.push(booking);
        }
        Ok(created)
    }

    // --- Reconciliation --------------------------------------------------------

    /// Applies a reconcile report in one pass over the write lock, matching spec.md §5's
    /// "single transaction" requirement for the PATCH. `used` above `total` is clamped,
    /// a warning is logged by the caller (the handler has the tracing span).
    pub async fn reconcile(&self, items: Vec<ReconcileItem>) -> (usize, Vec<String>) {
        let mut state = self.state.write().await;
        let mut updated = 0;
        let mut warnings = Vec::new();
        for item in items {
            let Some(feature) = state.find_feature_by_product_feature(&item.product_feature).cloned() else {
                warnings.push(format!("unknown feature `{}`, skipped", item.product_feature));
                continue;
            };
            let Some(inventory) = state.inventories.get_mut(&feature.id) else {
                warnings.push(format!("feature `{}` has no inventory row, skipped", item.product_feature));
                continue;
            };
            inventory.total = item.total;
            if item.used > item.total {
                warnings.push(format!(
                    "reported used ({}) exceeds total ({}) for `{}`, clamped",
                    item.used, item.total, item.product_feature
                ));
            }
            inventory.used = item.used.clamp(0, item.total);
            updated += 1;
        }
        (updated, warnings)
    }
}

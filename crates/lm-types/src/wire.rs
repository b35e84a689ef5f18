//! Wire-level request/response shapes that don't map 1:1 onto a persisted entity:
//! the reconcile PATCH payload and the booking-creation request
//! (spec.md §6, grounded on `original_source/agent/lm_agent/backend_utils/models.py`).

use serde::{Deserialize, Serialize};

use crate::product_feature::ProductFeature;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileItem {
    pub product_feature: ProductFeature,
    pub used: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileResult {
    pub updated: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseBookingItem {
    pub product_feature: ProductFeature,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingCreateRequest {
    pub slurm_job_id: i64,
    pub user_name: String,
    pub lead_host: String,
    #[serde(default)]
    pub bookings: Vec<LicenseBookingItem>,
}

//! The reconciliation cycle (spec.md §4.3), grounded on
//! `original_source/agent/lm_agent/reconciliation.py`'s `reconcile`/`clean_booked_grace_time`.
//!
//! One cycle: read the queue, sweep expired bookings, build a usage report from the
//! license-server adapters, PATCH it to the ledger. Bounded concurrency (default 16,
//! spec.md §5) gates both the adapter fan-out and the booking-expiry deletes; an overall
//! deadline (default 5 min) wraps the whole cycle.
//!
//! Unlike the original, which issued one `GET /booking/job/{id}` per running job, this
//! reads the whole cluster (configurations, features, inventories, jobs and their
//! bookings) in a single `GET /clusters/by_client_id` — the ledger's eager-loaded view
//! (spec.md §4.5) makes the per-job round trip unnecessary. The bounded fan-out instead
//! covers the adapter invocations and the expiry deletes, which are the calls that
//! actually benefit from running concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lm_client::AsyncLedgerClient;
use lm_types::entities::ClusterView;
use lm_types::error::CycleError;
use lm_types::wire::{ReconcileItem, ReconcileResult};
use lm_types::ProductFeature;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapters::{build_adapter, AdapterKind};
use crate::booking::{classify, greatest_grace_time, BookingFate};
use crate::queue::QueueSource;

#[derive(Debug, Clone, Copy)]
pub struct CycleConfig {
    pub fan_out: usize,
    pub deadline: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig { fan_out: 16, deadline: Duration::from_secs(5 * 60) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue read failed or returned nothing; the cycle did nothing (spec.md §4.3
    /// step 1 — this is not an error).
    Aborted,
    /// The report was built and PATCHed; `updated` is the ledger's count of features
    /// whose inventory changed.
    Completed { updated: usize, expired_bookings: usize },
}

pub async fn run_cycle(
    client: Arc<AsyncLedgerClient>,
    queue: &dyn QueueSource,
    config: CycleConfig,
) -> Result<CycleOutcome, CycleError> {
    match tokio::time::timeout(config.deadline, run_cycle_inner(client, queue, config.fan_out)).await {
        Ok(result) => result,
        Err(_) => Err(CycleError::Timeout),
    }
}

async fn run_cycle_inner(
    client: Arc<AsyncLedgerClient>,
    queue: &dyn QueueSource,
    fan_out: usize,
) -> Result<CycleOutcome, CycleError> {
    let Some(queued_jobs) = queue.read_queue().await else {
        return Ok(CycleOutcome::Aborted);
    };
    if queued_jobs.is_empty() {
        return Ok(CycleOutcome::Aborted);
    }

    let cluster: ClusterView = client
        .get("/clusters/by_client_id")
        .await
        .map_err(|e| CycleError::BackendUnavailable(e.to_string()))?;

    let grace_times: HashMap<i64, i64> =
        cluster.configurations.iter().map(|c| (c.id, c.grace_time)).collect();
    let feature_configs: HashMap<i64, i64> = cluster
        .configurations
        .iter()
        .flat_map(|c| c.features.iter().map(|f| (f.id, c.id)))
        .collect();

    let running = queued_jobs.iter().filter(|j| j.is_running());

    let expired_bookings =
        expire_stale_bookings(client.clone(), &cluster, running, &grace_times, &feature_configs, fan_out).await?;

    let report = build_report(&cluster, fan_out).await;
    if report.is_empty() {
        return Err(CycleError::NoData);
    }

    let result: ReconcileResult = client
        .patch("/reconcile", &report)
        .await
        .map_err(|e| CycleError::BackendUnavailable(e.to_string()))?;

    Ok(CycleOutcome::Completed { updated: result.updated, expired_bookings })
}

/// Deletes bookings for every running job whose run time has exceeded the greatest
/// grace_time across the configurations its bookings touch (spec.md §4.4). Returns how
/// many jobs' bookings were deleted. Runs before the report PATCH so the PATCH never
/// observes a booking set that's about to be deleted (spec.md §5's ordering guarantee).
async fn expire_stale_bookings<'a>(
    client: Arc<AsyncLedgerClient>,
    cluster: &ClusterView,
    running: impl Iterator<Item = &'a crate::queue::QueuedJob>,
    grace_times: &HashMap<i64, i64>,
    feature_configs: &HashMap<i64, i64>,
    fan_out: usize,
) -> Result<usize, CycleError> {
    let semaphore = Arc::new(Semaphore::new(fan_out.max(1)));
    let mut tasks = JoinSet::new();

    for job in running {
        let Some(job_view) = cluster.jobs.iter().find(|j| j.slurm_job_id == job.job_id) else {
            continue;
        };
        if job_view.bookings.is_empty() {
            continue;
        }
        let config_ids: Vec<i64> =
            job_view.bookings.iter().filter_map(|b| feature_configs.get(&b.feature_id).copied()).collect();
        let fate = classify(job.run_time_seconds, greatest_grace_time(&config_ids, grace_times));
        if fate != BookingFate::Expired {
            continue;
        }

        let semaphore = semaphore.clone();
        let slurm_job_id = job.job_id;
        let path = format!("/bookings/by_job/{slurm_job_id}");
        let client = client.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            if let Err(e) = client.delete(&path).await {
                tracing::warn!(slurm_job_id, error = %e, "failed to delete expired booking");
                false
            } else {
                true
            }
        });
    }

    let mut expired = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap_or(false) {
            expired += 1;
        }
    }
    Ok(expired)
}

/// Invokes every configured feature's adapter concurrently (bounded fan-out) and
/// collects the successes into a reconcile report. Individual failures are logged and
/// the feature is dropped from the report rather than aborting the cycle (spec.md §4.3
/// step 6, §7).
async fn build_report(cluster: &ClusterView, fan_out: usize) -> Vec<ReconcileItem> {
    let semaphore = Arc::new(Semaphore::new(fan_out.max(1)));
    let mut tasks = JoinSet::new();

    for config in &cluster.configurations {
        let adapter = Arc::from(build_adapter(AdapterKind::from(config.kind), config.license_servers.clone()));
        for feature in &config.features {
            let Ok(product_feature) = ProductFeature::try_from(format!("{}.{}", feature.product.name, feature.name))
            else {
                tracing::warn!(feature = %feature.name, "feature name is not a valid product.feature key, skipping");
                continue;
            };
            let semaphore = semaphore.clone();
            let adapter: Arc<dyn crate::adapters::LicenseServerAdapter> = Arc::clone(&adapter);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                adapter.report_item(&product_feature).await.map_err(|e| (product_feature, e))
            });
        }
    }

    let mut report = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(item)) => report.push(item),
            Ok(Err((product_feature, e))) => {
                tracing::warn!(feature = %product_feature, error = %e, "adapter failed, dropping feature from report");
            }
            Err(e) => tracing::warn!(error = %e, "adapter task panicked"),
        }
    }
    report
}

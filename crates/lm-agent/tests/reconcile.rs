//! Exercises [`lm_agent::reconcile::run_cycle`] against a mocked ledger and identity
//! provider, covering the abort/no-data/expiry paths that don't require a real
//! license-server adapter subprocess (spec.md §8 scenario 2, §4.3 step 1).

use lm_agent::queue::{QueuedJob, StaticQueueSource};
use lm_agent::reconcile::{run_cycle, CycleConfig, CycleOutcome};
use lm_client::{AsyncLedgerClient, Auth0Config};
use lm_types::error::CycleError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_auth_config(idp_uri: String) -> Auth0Config {
    Auth0Config {
        domain: idp_uri,
        audience: "https://ledger.test".into(),
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
    }
}

async fn mount_token_endpoint(idp: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fake-token"})))
        .mount(idp)
        .await;
}

fn running_job(job_id: i64, run_time_seconds: i64) -> QueuedJob {
    QueuedJob { job_id, user: "alice".into(), state: "RUNNING".into(), run_time_seconds }
}

#[tokio::test]
async fn empty_queue_aborts_without_calling_the_ledger() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;
    mount_token_endpoint(&idp).await;

    let client = Arc::new(AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri())));
    let queue = StaticQueueSource(Some(Vec::new()));

    let outcome = run_cycle(client, &queue, CycleConfig::default()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Aborted);
}

#[tokio::test]
async fn missing_queue_read_aborts_without_calling_the_ledger() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;
    mount_token_endpoint(&idp).await;

    let client = Arc::new(AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri())));
    let queue = StaticQueueSource(None);

    let outcome = run_cycle(client, &queue, CycleConfig::default()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Aborted);
}

#[tokio::test]
async fn cluster_with_no_configurations_yields_no_data() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;
    mount_token_endpoint(&idp).await;

    Mock::given(method("GET"))
        .and(path("/clusters/by_client_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "name": "cluster-a",
            "client_id": "agent-a",
            "configurations": [],
            "jobs": [],
        })))
        .mount(&ledger)
        .await;

    let client = Arc::new(AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri())));
    let queue = StaticQueueSource(Some(vec![running_job(123, 60)]));

    let err = run_cycle(client, &queue, CycleConfig::default()).await.unwrap_err();
    assert!(matches!(err, CycleError::NoData));
}

#[tokio::test]
async fn expired_booking_is_deleted_even_when_the_cycle_has_no_data_to_report() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;
    mount_token_endpoint(&idp).await;

    Mock::given(method("GET"))
        .and(path("/clusters/by_client_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "name": "cluster-a",
            "client_id": "agent-a",
            "configurations": [{
                "id": 10,
                "name": "abaqus-config",
                "cluster_id": 1,
                "type": "flexlm",
                "grace_time": 0,
                "license_servers": [],
                "features": [{
                    "id": 99,
                    "name": "standard",
                    "product": {"id": 1, "name": "abaqus"},
                    "config_id": 10,
                    "reserved": 0,
                    "inventory": null,
                }],
            }],
            "jobs": [{
                "id": 5,
                "slurm_job_id": 123,
                "cluster_id": 1,
                "username": "alice",
                "lead_host": "node01",
                "bookings": [{"id": 1, "job_id": 5, "feature_id": 99, "quantity": 1}],
            }],
        })))
        .mount(&ledger)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/bookings/by_job/123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&ledger)
        .await;

    let client = Arc::new(AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri())));
    // The feature has no license servers, so the adapter fan-out produces an empty
    // report (NoData) without shelling out to any real vendor tool; what this test
    // actually exercises is that the booking expiry delete still fires first.
    let queue = StaticQueueSource(Some(vec![running_job(123, 1)]));

    let err = run_cycle(client, &queue, CycleConfig::default()).await.unwrap_err();
    assert!(matches!(err, CycleError::NoData));
}

#[tokio::test]
async fn cycle_times_out_when_the_queue_read_never_returns() {
    use async_trait::async_trait;

    struct HangingQueue;

    #[async_trait]
    impl lm_agent::queue::QueueSource for HangingQueue {
        async fn read_queue(&self) -> Option<Vec<QueuedJob>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            None
        }
    }

    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;
    mount_token_endpoint(&idp).await;

    let client = Arc::new(AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri())));
    let queue = HangingQueue;
    let config = CycleConfig { fan_out: 4, deadline: Duration::from_millis(50) };

    let err = run_cycle(client, &queue, config).await.unwrap_err();
    assert!(matches!(err, CycleError::Timeout));
}

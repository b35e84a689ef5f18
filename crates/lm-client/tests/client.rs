use lm_client::{AsyncLedgerClient, Auth0Config};
use serde::Deserialize;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_auth_config(domain: String) -> Auth0Config {
    Auth0Config {
        domain,
        audience: "https://ledger.test".into(),
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Echo {
    ok: bool,
}

#[tokio::test]
async fn acquires_token_once_and_reuses_it_for_a_second_call() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fake-token",
        })))
        .expect(1)
        .mount(&idp)
        .await;

    Mock::given(method("GET"))
        .and(path("/features"))
        .and(header("authorization", "Bearer fake-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(2)
        .mount(&ledger)
        .await;

    let client = AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri()));

    let first: Echo = client.get("/features").await.unwrap();
    let second: Echo = client.get("/features").await.unwrap();
    assert_eq!(first, Echo { ok: true });
    assert_eq!(second, Echo { ok: true });
}

#[tokio::test]
async fn surfaces_non_success_status_as_unexpected_status_error() {
    let idp = MockServer::start().await;
    let ledger = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fake-token",
        })))
        .mount(&idp)
        .await;

    Mock::given(method("GET"))
        .and(path("/features/999"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&ledger)
        .await;

    let client = AsyncLedgerClient::new(ledger.uri(), test_auth_config(idp.uri()));

    let err = client.get::<Echo>("/features/999").await.unwrap_err();
    match err {
        lm_types::error::ClientError::UnexpectedStatus { status, .. } => assert_eq!(status, 404),
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}
